//! Ticket listing, filtering, paginated search and counters.

use chrono::{Duration, NaiveDate, NaiveTime};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::{AppError, AppResult};
use crate::core::shared::enums::{Criticality, TicketStatus};
use crate::core::shared::models::{Ticket, User};
use crate::core::shared::schema::tickets;

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

diesel::define_sql_function!(fn lower(x: Text) -> Text);

/// Filters shared by the dashboard and "my tickets" pages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub criticality: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Date,
    Criticality,
}

impl TicketFilter {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn status(&self) -> Option<TicketStatus> {
        Self::non_empty(&self.status).and_then(|s| TicketStatus::from_str(s).ok())
    }

    pub fn criticality(&self) -> Option<Criticality> {
        Self::non_empty(&self.criticality).and_then(|s| Criticality::from_str(s).ok())
    }

    pub fn from_date(&self) -> Option<NaiveDate> {
        Self::non_empty(&self.from).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        Self::non_empty(&self.to).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    pub fn text(&self) -> Option<&str> {
        Self::non_empty(&self.q)
    }

    pub fn sort_key(&self) -> SortKey {
        match Self::non_empty(&self.sort) {
            Some("id") => SortKey::Id,
            Some("criticality") => SortKey::Criticality,
            _ => SortKey::Date,
        }
    }

    pub fn ascending(&self) -> bool {
        Self::non_empty(&self.order) == Some("asc")
    }
}

fn like_pattern(text: &str) -> String {
    let escaped = text
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn base_query<'a>(
    author: Option<i32>,
    status: Option<TicketStatus>,
    criticality: Option<Criticality>,
    text: Option<&str>,
) -> tickets::BoxedQuery<'a, Sqlite> {
    let mut query = tickets::table.into_boxed();
    if let Some(author) = author {
        query = query.filter(tickets::author_id.eq(author));
    }
    if let Some(status) = status {
        query = query.filter(tickets::status.eq(status));
    }
    if let Some(criticality) = criticality {
        query = query.filter(tickets::criticality.eq(criticality));
    }
    if let Some(text) = text {
        let pattern = like_pattern(text);
        query = query.filter(
            lower(tickets::title)
                .like(pattern.clone())
                .escape('\\')
                .or(lower(tickets::description).like(pattern).escape('\\')),
        );
    }
    query
}

/// Only administrators see every ticket.
fn scope_for(user: &User) -> Option<i32> {
    if user.is_admin {
        None
    } else {
        Some(user.id)
    }
}

/// Tickets visible to `user` matching `filter`, sorted as requested.
pub fn list_tickets(conn: &mut SqliteConnection, user: &User, filter: &TicketFilter) -> QueryResult<Vec<Ticket>> {
    let mut query = base_query(scope_for(user), filter.status(), filter.criticality(), filter.text());

    if let Some(from) = filter.from_date() {
        query = query.filter(tickets::created_at.ge(from.and_time(NaiveTime::MIN)));
    }
    if let Some(to) = filter.to_date() {
        query = query.filter(tickets::created_at.lt((to + Duration::days(1)).and_time(NaiveTime::MIN)));
    }

    let asc = filter.ascending();
    query = match (filter.sort_key(), asc) {
        (SortKey::Id, true) => query.order(tickets::id.asc()),
        (SortKey::Id, false) => query.order(tickets::id.desc()),
        (_, true) => query.order((tickets::created_at.asc(), tickets::id.asc())),
        (_, false) => query.order((tickets::created_at.desc(), tickets::id.desc())),
    };

    let mut rows: Vec<Ticket> = query.select(Ticket::as_select()).load(conn)?;

    // Stored as text, so rank ordering happens here. The sort is stable and
    // keeps newest first within a rank.
    if filter.sort_key() == SortKey::Criticality {
        if asc {
            rows.sort_by_key(|t| t.criticality.rank());
        } else {
            rows.sort_by_key(|t| std::cmp::Reverse(t.criticality.rank()));
        }
    }
    Ok(rows)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub criticality: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub tickets: Vec<Ticket>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

pub fn search(conn: &mut SqliteConnection, user: &User, params: &SearchQuery) -> AppResult<SearchPage> {
    let status = match params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(TicketStatus::from_str(s).map_err(|_| AppError::validation(format!("Invalid status: {s}")))?),
        None => None,
    };
    let criticality = match params.criticality.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(
            Criticality::from_str(s).map_err(|_| AppError::validation(format!("Invalid criticality: {s}")))?,
        ),
        None => None,
    };
    let text = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let per_page = params
        .per_page
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_PER_PAGE)
        .min(MAX_PER_PAGE);
    let page = params.page.unwrap_or(1).clamp(1, i64::MAX / per_page);
    let scope = scope_for(user);

    let total: i64 = base_query(scope, status, criticality, text)
        .count()
        .get_result(conn)?;

    let rows = base_query(scope, status, criticality, text)
        .order((tickets::created_at.desc(), tickets::id.desc()))
        .limit(per_page)
        .offset((page - 1).saturating_mul(per_page))
        .select(Ticket::as_select())
        .load(conn)?;

    Ok(SearchPage {
        tickets: rows,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub closed: i64,
    pub rejected: i64,
    pub urgent: i64,
}

impl TicketStats {
    pub fn count(&self, status: TicketStatus) -> i64 {
        match status {
            TicketStatus::Open => self.open,
            TicketStatus::InProgress => self.in_progress,
            TicketStatus::Closed => self.closed,
            TicketStatus::Rejected => self.rejected,
        }
    }

    pub fn from_tickets<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> Self {
        let mut stats = Self::default();
        for ticket in tickets {
            stats.add(ticket.status, ticket.criticality);
        }
        stats
    }

    fn add(&mut self, status: TicketStatus, criticality: Criticality) {
        self.total += 1;
        match status {
            TicketStatus::Open => self.open += 1,
            TicketStatus::InProgress => self.in_progress += 1,
            TicketStatus::Closed => self.closed += 1,
            TicketStatus::Rejected => self.rejected += 1,
        }
        if criticality == Criticality::Urgent {
            self.urgent += 1;
        }
    }
}

/// Counters over every ticket visible to `user`.
pub fn stats(conn: &mut SqliteConnection, user: &User) -> QueryResult<TicketStats> {
    let rows: Vec<(TicketStatus, Criticality)> = base_query(scope_for(user), None, None, None)
        .select((tickets::status, tickets::criticality))
        .load(conn)?;

    let mut stats = TicketStats::default();
    for (status, criticality) in rows {
        stats.add(status, criticality);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_ticket, insert_user, test_context};
    use crate::core::shared::utils::now;

    #[test]
    fn test_search_paginates_case_insensitively() {
        let ctx = test_context();
        let user = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        for i in 0..23 {
            let title = if i % 2 == 0 { format!("NETWORK down {i}") } else { format!("Printer {i}") };
            let desc = if i % 2 == 0 { "cable".to_string() } else { "the Network is slow".to_string() };
            insert_ticket(&ctx.state, user.id, &title, &desc);
        }
        insert_ticket(&ctx.state, user.id, "Keyboard", "broken key");

        let mut conn = ctx.state.db().expect("conn");
        let page = search(
            &mut conn,
            &user,
            &SearchQuery {
                q: Some("network".into()),
                page: Some(2),
                per_page: Some(10),
                ..Default::default()
            },
        )
        .expect("search");

        assert_eq!(page.total, 23);
        assert_eq!(page.tickets.len(), 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn test_search_clamps_and_scopes() {
        let ctx = test_context();
        let ana = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let bia = insert_user(&ctx.state, "Bia", "bia@example.com", false);
        let admin = insert_user(&ctx.state, "Root", "root@example.com", true);
        insert_ticket(&ctx.state, ana.id, "Mine", "a");
        insert_ticket(&ctx.state, bia.id, "Theirs", "b");

        let mut conn = ctx.state.db().expect("conn");
        let params = SearchQuery {
            page: Some(0),
            per_page: Some(1000),
            ..Default::default()
        };
        let own = search(&mut conn, &ana, &params).expect("search");
        assert_eq!(own.page, 1);
        assert_eq!(own.per_page, MAX_PER_PAGE);
        assert_eq!(own.total, 1);
        assert_eq!(own.tickets[0].title, "Mine");

        assert_eq!(search(&mut conn, &admin, &params).expect("search").total, 2);
    }

    #[test]
    fn test_search_huge_page_is_empty_not_overflow() {
        let ctx = test_context();
        let ana = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        insert_ticket(&ctx.state, ana.id, "Mine", "a");

        let mut conn = ctx.state.db().expect("conn");
        let page = search(
            &mut conn,
            &ana,
            &SearchQuery {
                page: Some(i64::MAX),
                per_page: Some(10),
                ..Default::default()
            },
        )
        .expect("search");
        assert_eq!(page.total, 1);
        assert!(page.tickets.is_empty());
        assert_eq!(page.page, i64::MAX / 10);
    }

    #[test]
    fn test_search_rejects_unknown_status() {
        let ctx = test_context();
        let ana = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let mut conn = ctx.state.db().expect("conn");
        let result = search(
            &mut conn,
            &ana,
            &SearchQuery {
                status: Some("bogus".into()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_Off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_list_filters_and_sorts_by_criticality() {
        let ctx = test_context();
        let admin = insert_user(&ctx.state, "Root", "root@example.com", true);
        let low = insert_ticket(&ctx.state, admin.id, "Low one", "x");
        let urgent = insert_ticket(&ctx.state, admin.id, "Urgent one", "x");
        let mut conn = ctx.state.db().expect("conn");
        diesel::update(tickets::table.find(low.id))
            .set(tickets::criticality.eq(Criticality::Low))
            .execute(&mut conn)
            .expect("update");
        diesel::update(tickets::table.find(urgent.id))
            .set((
                tickets::criticality.eq(Criticality::Urgent),
                tickets::status.eq(TicketStatus::InProgress),
            ))
            .execute(&mut conn)
            .expect("update");

        let by_rank = list_tickets(
            &mut conn,
            &admin,
            &TicketFilter {
                sort: Some("criticality".into()),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(by_rank.first().map(|t| t.id), Some(urgent.id));
        assert_eq!(by_rank.last().map(|t| t.id), Some(low.id));

        let in_progress = list_tickets(
            &mut conn,
            &admin,
            &TicketFilter {
                status: Some("in_progress".into()),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(in_progress.len(), 1);

        let today = now().date().format("%Y-%m-%d").to_string();
        let today_only = list_tickets(
            &mut conn,
            &admin,
            &TicketFilter {
                from: Some(today.clone()),
                to: Some(today),
                ..Default::default()
            },
        )
        .expect("list");
        assert_eq!(today_only.len(), 2);

        let stats = stats(&mut conn, &admin).expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.urgent, 1);
        assert_eq!(stats.count(TicketStatus::Open), 1);
    }
}
