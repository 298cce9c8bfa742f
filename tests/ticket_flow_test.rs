mod common;

#[cfg(test)]
mod ticket_flow_tests {
    use axum::http::{header, StatusCode};
    use serde_json::json;

    use super::common::{delete, get, json_request, upload, TestApp};

    #[tokio::test]
    async fn test_create_ticket_persists_open_ticket_for_author() {
        let app = TestApp::new();
        let author = app.user("Ana", "ana@example.com", false);
        let token = app.login("ana@example.com").await;

        let (status, body) = app
            .json(json_request(
                "POST",
                "/api/tickets",
                Some(&token),
                json!({ "title": "VPN down", "description": "Cannot connect since 9am", "criticality": "high" }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["ticket"]["status"], "open");
        assert_eq!(body["ticket"]["criticality"], "high");
        assert_eq!(body["ticket"]["author_id"], author.id);
    }

    #[tokio::test]
    async fn test_ticket_detail_is_restricted_to_owner_and_admins() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        app.user("Bruno", "bruno@example.com", false);
        app.user("Admin", "admin@example.com", true);
        let owner = app.login("ana@example.com").await;
        let other = app.login("bruno@example.com").await;
        let admin = app.login("admin@example.com").await;

        let (_, created) = app
            .json(json_request(
                "POST",
                "/api/tickets",
                Some(&owner),
                json!({ "title": "Printer", "description": "Paper jam" }),
            ))
            .await;
        let uri = format!("/api/tickets/{}", created["ticket"]["id"]);

        let (status, body) = app.json(get(&uri, Some(&other))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let (status, body) = app.json(get(&uri, Some(&owner))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["author_name"], "Ana");

        let (status, _) = app.json(get(&uri, Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_closing_twice_fails_without_second_notification() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        app.user("Admin", "admin@example.com", true);
        let owner = app.login("ana@example.com").await;
        let admin = app.login("admin@example.com").await;

        let (_, created) = app
            .json(json_request(
                "POST",
                "/api/tickets",
                Some(&owner),
                json!({ "title": "Laptop", "description": "Battery swollen" }),
            ))
            .await;
        let close = format!("/api/tickets/{}/close", created["ticket"]["id"]);

        let (status, body) = app.json(json_request("POST", &close, Some(&admin), json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["ticket"]["status"], "closed");

        let (_, before) = app.json(get("/api/notifications", Some(&owner))).await;
        let sent_before = app.mail.sent().len();

        let (status, body) = app.json(json_request("POST", &close, Some(&admin), json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Ticket is already closed");

        let (_, after) = app.json(get("/api/notifications", Some(&owner))).await;
        assert_eq!(before["notifications"].as_array().map(Vec::len), after["notifications"].as_array().map(Vec::len));
        assert_eq!(app.mail.sent().len(), sent_before);
    }

    #[tokio::test]
    async fn test_reject_requires_justification_and_admin() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        app.user("Admin", "admin@example.com", true);
        let owner = app.login("ana@example.com").await;
        let admin = app.login("admin@example.com").await;

        let (_, created) = app
            .json(json_request(
                "POST",
                "/api/tickets",
                Some(&owner),
                json!({ "title": "Access", "description": "Need admin rights" }),
            ))
            .await;
        let id = created["ticket"]["id"].clone();
        let reject = format!("/api/tickets/{id}/reject");

        let (status, _) = app
            .json(json_request("POST", &reject, Some(&owner), json!({ "justification": "no" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .json(json_request("POST", &reject, Some(&admin), json!({ "justification": "   " })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, detail) = app.json(get(&format!("/api/tickets/{id}"), Some(&owner))).await;
        assert_eq!(detail["status"], "open");

        let (status, body) = app
            .json(json_request("POST", &reject, Some(&admin), json!({ "justification": "Not supported" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ticket"]["status"], "rejected");
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_paginated() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        let token = app.login("ana@example.com").await;

        for i in 0..23 {
            let (title, description) = if i % 2 == 0 {
                (format!("NETWORK issue {i}"), "Switch offline".to_string())
            } else {
                (format!("Ticket {i}"), "The Network is slow".to_string())
            };
            let (status, _) = app
                .json(json_request(
                    "POST",
                    "/api/tickets",
                    Some(&token),
                    json!({ "title": title, "description": description }),
                ))
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        app.json(json_request(
            "POST",
            "/api/tickets",
            Some(&token),
            json!({ "title": "Mouse", "description": "Broken wheel" }),
        ))
        .await;

        let (status, body) = app
            .json(get("/api/search?q=network&page=2&per_page=10", Some(&token)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 23);
        assert_eq!(body["page"], 2);
        assert_eq!(body["total_pages"], 3);
        assert_eq!(body["tickets"].as_array().map(Vec::len), Some(10));

        let (_, last) = app.json(get("/api/search?q=network&page=3", Some(&token))).await;
        assert_eq!(last["tickets"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_empty_pdf_export_contains_message() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        let token = app.login("ana@example.com").await;

        let (status, headers, body) = app.send(get("/tickets/export/pdf", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/pdf")
        );
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(disposition.starts_with("attachment; filename=\"tickets_"));

        let doc = lopdf::Document::load_mem(&body).expect("valid pdf");
        let pages = doc.get_pages();
        let first = pages.values().next().expect("one page");
        let content = doc.get_page_content(*first).expect("content");
        assert!(String::from_utf8_lossy(&content).contains("No tickets found."));
    }

    #[tokio::test]
    async fn test_detail_pdf_requires_visibility() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        app.user("Bruno", "bruno@example.com", false);
        let owner = app.login("ana@example.com").await;
        let other = app.login("bruno@example.com").await;

        let (_, created) = app
            .json(json_request(
                "POST",
                "/api/tickets",
                Some(&owner),
                json!({ "title": "Monitor", "description": "Flickering" }),
            ))
            .await;
        let uri = format!("/tickets/{}/export/pdf", created["ticket"]["id"]);

        let (status, _, _) = app.send(get(&uri, Some(&other))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = app.send(get(&uri, Some(&owner))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(b"%PDF"));
    }

    async fn open_ticket(app: &TestApp, token: &str) -> i64 {
        let (_, created) = app
            .json(json_request(
                "POST",
                "/api/tickets",
                Some(token),
                json!({ "title": "Scanner", "description": "Driver crash" }),
            ))
            .await;
        created["ticket"]["id"].as_i64().expect("ticket id")
    }

    #[tokio::test]
    async fn test_attachment_download_is_limited_to_viewers() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        app.user("Bruno", "bruno@example.com", false);
        app.user("Admin", "admin@example.com", true);
        let owner = app.login("ana@example.com").await;
        let other = app.login("bruno@example.com").await;
        let admin = app.login("admin@example.com").await;
        let ticket_id = open_ticket(&app, &owner).await;

        let (status, body) = app.json(upload(&owner, ticket_id, "notes.txt", b"driver log")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["attachment"].get("path").is_none());
        let uri = format!("/api/attachments/{}/download", body["attachment"]["id"]);

        let (status, headers, bytes) = app.send(get(&uri, Some(&owner))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get(header::CONTENT_DISPOSITION).and_then(|v| v.to_str().ok()),
            Some("attachment; filename=\"notes.txt\"")
        );
        assert_eq!(bytes, b"driver log");

        let (status, _, _) = app.send(get(&uri, Some(&other))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, bytes) = app.send(get(&uri, Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"driver log");
    }

    #[tokio::test]
    async fn test_download_of_missing_file_is_not_found() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        let owner = app.login("ana@example.com").await;
        let ticket_id = open_ticket(&app, &owner).await;

        let (_, body) = app.json(upload(&owner, ticket_id, "gone.txt", b"soon removed")).await;
        let stored = body["attachment"]["stored_name"].as_str().expect("stored name");
        std::fs::remove_file(app.state.config.uploads.dir.join(stored)).expect("remove");

        let uri = format!("/api/attachments/{}/download", body["attachment"]["id"]);
        let (status, body) = app.json(get(&uri, Some(&owner))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_attachment_delete_by_owner_or_admin_only() {
        let app = TestApp::new();
        app.user("Ana", "ana@example.com", false);
        app.user("Bruno", "bruno@example.com", false);
        app.user("Admin", "admin@example.com", true);
        let owner = app.login("ana@example.com").await;
        let other = app.login("bruno@example.com").await;
        let admin = app.login("admin@example.com").await;
        let ticket_id = open_ticket(&app, &owner).await;

        let (_, first) = app.json(upload(&owner, ticket_id, "a.txt", b"first")).await;
        let (_, second) = app.json(upload(&owner, ticket_id, "b.txt", b"second")).await;
        let first_uri = format!("/api/attachments/{}", first["attachment"]["id"]);
        let second_uri = format!("/api/attachments/{}", second["attachment"]["id"]);
        let first_file = app
            .state
            .config
            .uploads
            .dir
            .join(first["attachment"]["stored_name"].as_str().expect("stored name"));
        assert!(first_file.exists());

        let (status, _) = app.json(delete(&first_uri, &other)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.json(delete(&first_uri, &owner)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(!first_file.exists());
        let (status, _) = app.json(get(&first_uri, Some(&owner))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.json(delete(&second_uri, &admin)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
