//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// One survey occurrence per sector and quarter.
    surveys (id) {
        id -> Uuid,
        title -> Text,
        sector -> Text,
        year -> Int4,
        /// Constrained to 1..=4.
        quarter -> Int2,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    survey_sections (id) {
        id -> Uuid,
        survey_id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        sort_order -> Int4,
        pillar -> Text,
    }
}

diesel::table! {
    questions (id) {
        id -> Uuid,
        section_id -> Uuid,
        question_text -> Text,
        question_type -> Text,
        /// Array of `{ value, label }` objects.
        options -> Jsonb,
        is_required -> Bool,
        sort_order -> Int4,
        metadata -> Jsonb,
    }
}

diesel::table! {
    branching_rules (id) {
        id -> Uuid,
        survey_id -> Uuid,
        sequence -> Int4,
        source_question_id -> Uuid,
        /// `{ operator, value }`.
        condition -> Jsonb,
        action -> Text,
        target_section_id -> Nullable<Uuid>,
        target_question_id -> Nullable<Uuid>,
        explanation -> Nullable<Text>,
    }
}

diesel::table! {
    /// Submission dimensions. Answers live in `answers`.
    submissions (id) {
        id -> Uuid,
        survey_id -> Uuid,
        sector -> Text,
        year -> Int4,
        quarter -> Int2,
        size_band -> Text,
        submitted_at -> Timestamptz,
    }
}

diesel::table! {
    /// Exactly one of `answer_value` and `answer_values` is set.
    answers (id) {
        id -> Uuid,
        submission_id -> Uuid,
        question_id -> Uuid,
        answer_value -> Nullable<Text>,
        answer_values -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    receipt_codes (id) {
        id -> Uuid,
        /// Lowercase hex SHA-256 of the normalised code.
        code_hash -> Text,
        submission_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    aggregates_cache (id) {
        id -> Uuid,
        cache_key -> Text,
        dimensions -> Jsonb,
        result -> Jsonb,
        response_count -> Int8,
        computed_at -> Timestamptz,
    }
}

diesel::table! {
    admin_audit_log (id) {
        id -> Uuid,
        actor -> Text,
        action -> Text,
        details -> Jsonb,
        performed_at -> Timestamptz,
    }
}

diesel::joinable!(survey_sections -> surveys (survey_id));
diesel::joinable!(questions -> survey_sections (section_id));
diesel::joinable!(branching_rules -> surveys (survey_id));
diesel::joinable!(submissions -> surveys (survey_id));
diesel::joinable!(answers -> submissions (submission_id));
diesel::joinable!(receipt_codes -> submissions (submission_id));

diesel::allow_tables_to_appear_in_same_query!(
    surveys,
    survey_sections,
    questions,
    branching_rules,
    submissions,
    answers,
    receipt_codes,
    aggregates_cache,
    admin_audit_log,
);
