#[derive(Debug)]
pub struct ApiUrls;

impl ApiUrls {
    pub const HEALTH: &'static str = "/api/health";
    pub const LOGIN: &'static str = "/api/login";

    // Tickets - JSON APIs
    pub const TICKETS: &'static str = "/api/tickets";
    pub const TICKET_BY_ID: &'static str = "/api/tickets/:id";
    pub const TICKET_RESPONSES: &'static str = "/api/tickets/:id/responses";
    pub const TICKET_CLOSE: &'static str = "/api/tickets/:id/close";
    pub const TICKET_REJECT: &'static str = "/api/tickets/:id/reject";
    pub const TICKET_STATUS: &'static str = "/api/tickets/:id/status";
    pub const TICKET_STATS: &'static str = "/api/tickets/stats";
    pub const TICKETS_PDF: &'static str = "/api/tickets/export/pdf";
    pub const SEARCH: &'static str = "/api/search";

    // Notifications - JSON APIs
    pub const NOTIFICATIONS: &'static str = "/api/notifications";
    pub const NOTIFICATIONS_UNREAD: &'static str = "/api/notifications/unread";
    pub const NOTIFICATIONS_READ_ALL: &'static str = "/api/notifications/read-all";
    pub const NOTIFICATION_BY_ID: &'static str = "/api/notifications/:id";
    pub const NOTIFICATION_READ: &'static str = "/api/notifications/:id/read";

    // Attachments - JSON APIs
    pub const ATTACHMENTS: &'static str = "/api/attachments";
    pub const ATTACHMENT_BY_ID: &'static str = "/api/attachments/:id";
    pub const ATTACHMENT_DOWNLOAD: &'static str = "/api/attachments/:id/download";

    // Users - JSON APIs
    pub const USERS: &'static str = "/api/users";
    pub const USER_BY_ID: &'static str = "/api/users/:id";

    pub const EMAIL_SEND: &'static str = "/api/email/send";
}

#[derive(Debug)]
pub struct PageUrls;

impl PageUrls {
    pub const HOME: &'static str = "/";
    pub const LOGIN: &'static str = "/login";
    pub const LOGOUT: &'static str = "/logout";
    pub const REGISTER: &'static str = "/register";
    pub const FORGOT_PASSWORD: &'static str = "/forgot-password";
    pub const RESET_PASSWORD: &'static str = "/reset-password/:token";
    pub const DASHBOARD: &'static str = "/dashboard";
    pub const MY_TICKETS: &'static str = "/my-tickets";
    pub const TICKET_NEW: &'static str = "/tickets/new";
    pub const TICKET_DETAIL: &'static str = "/tickets/:id";
    pub const TICKET_RESPOND: &'static str = "/tickets/:id/respond";
    pub const TICKET_CLOSE: &'static str = "/tickets/:id/close";
    pub const TICKET_REJECT: &'static str = "/tickets/:id/reject";
    pub const TICKETS_PDF: &'static str = "/tickets/export/pdf";
    pub const TICKET_PDF: &'static str = "/tickets/:id/export/pdf";
    pub const NOTIFICATIONS: &'static str = "/notifications";
    pub const NOTIFICATIONS_READ_ALL: &'static str = "/notifications/read-all";
}

impl ApiUrls {
    pub fn with_params(url: &str, params: &[(&str, &str)]) -> String {
        let mut result = url.to_string();
        for (key, value) in params {
            result = result.replace(&format!(":{key}"), value);
        }
        result
    }

    pub fn with_query(url: &str, params: &[(&str, &str)]) -> String {
        if params.is_empty() {
            return url.to_string();
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{url}?{query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_params() {
        assert_eq!(
            ApiUrls::with_params(PageUrls::TICKET_DETAIL, &[("id", "7")]),
            "/tickets/7"
        );
    }

    #[test]
    fn test_with_query_encodes_values() {
        assert_eq!(
            ApiUrls::with_query(PageUrls::LOGIN, &[("next", "/tickets/7?x=1")]),
            "/login?next=%2Ftickets%2F7%3Fx%3D1"
        );
        assert_eq!(ApiUrls::with_query("/a", &[]), "/a");
    }
}
