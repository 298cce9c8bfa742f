diesel::table! {
    users (id) {
        id -> Integer,
        name -> Text,
        email -> Text,
        password_hash -> Text,
        is_admin -> Bool,
        reset_token -> Nullable<Text>,
        reset_token_expires_at -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    tickets (id) {
        id -> Integer,
        title -> Text,
        description -> Text,
        status -> Text,
        criticality -> Text,
        created_at -> Timestamp,
        author_id -> Integer,
    }
}

diesel::table! {
    responses (id) {
        id -> Integer,
        content -> Text,
        created_at -> Timestamp,
        ticket_id -> Integer,
        author_id -> Integer,
    }
}

diesel::table! {
    notifications (id) {
        id -> Integer,
        user_id -> Integer,
        ticket_id -> Nullable<Integer>,
        kind -> Text,
        message -> Text,
        read -> Bool,
        created_at -> Timestamp,
    }
}

diesel::table! {
    attachments (id) {
        id -> Integer,
        filename -> Text,
        stored_name -> Text,
        path -> Text,
        content_type -> Text,
        size -> BigInt,
        created_at -> Timestamp,
        uploaded_by -> Integer,
        ticket_id -> Nullable<Integer>,
        response_id -> Nullable<Integer>,
    }
}

diesel::joinable!(tickets -> users (author_id));
diesel::joinable!(responses -> tickets (ticket_id));
diesel::joinable!(responses -> users (author_id));
diesel::joinable!(notifications -> users (user_id));
diesel::joinable!(notifications -> tickets (ticket_id));
diesel::joinable!(attachments -> tickets (ticket_id));
diesel::joinable!(attachments -> responses (response_id));
diesel::joinable!(attachments -> users (uploaded_by));

diesel::allow_tables_to_appear_in_same_query!(users, tickets, responses, notifications, attachments);
