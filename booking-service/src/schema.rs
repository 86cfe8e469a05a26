diesel::table! {
    push_tokens (user_id, token) {
        user_id -> Uuid,
        token -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        resource_id -> Uuid,
        user_id -> Uuid,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        status -> Varchar,
        priority -> Varchar,
        reason -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    resources (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Text,
        image -> Nullable<Text>,
        is_computer -> Bool,
        system_username -> Nullable<Varchar>,
        system_ip -> Nullable<Varchar>,
        system_password -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        is_admin -> Bool,
        is_approved -> Bool,
        push_enabled -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        profile_picture -> Nullable<Text>,
    }
}

diesel::joinable!(push_tokens -> users (user_id));
diesel::joinable!(reservations -> resources (resource_id));
diesel::joinable!(reservations -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    push_tokens,
    reservations,
    resources,
    users,
);
