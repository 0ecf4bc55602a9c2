// Diesel table definitions. Kept in sync with repository/schema_sqlite.sql.

diesel::table! {
    technical_specifications (id) {
        id -> Text,
        name -> Text,
        user_id -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    versions (id) {
        id -> Text,
        technical_specification_id -> Text,
        version_number -> BigInt,
        created_at -> Text,
        updated_at -> Text,
        status -> Text,
        progress -> Integer,
        original_file_id -> Nullable<Text>,
        original_file_size -> Nullable<BigInt>,
        out_html -> Nullable<Text>,
        css -> Nullable<Text>,
        report_file_id -> Nullable<Text>,
        tokens_total -> Nullable<BigInt>,
        cost_total_rub -> Nullable<Double>,
        inspection_duration_ms -> Nullable<BigInt>,
        number_of_errors -> Nullable<BigInt>,
        llm_report -> Nullable<Text>,
        failure_code -> Nullable<Text>,
        failure_message -> Nullable<Text>,
    }
}

diesel::table! {
    errors (id) {
        id -> Text,
        version_id -> Text,
        group_id -> Text,
        error_code -> Text,
        order_number -> BigInt,
        verdict -> Nullable<Text>,
        preliminary_notes -> Nullable<Text>,
        overall_critique -> Nullable<Text>,
        process_analysis -> Nullable<Text>,
        process_critique -> Nullable<Text>,
        process_verification -> Nullable<Text>,
        process_retrieval -> Text,
        instances -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    invalid_instances (id) {
        id -> Text,
        error_id -> Text,
        version_id -> Text,
        numeric_id -> BigInt,
        html_id -> Text,
        quote -> Text,
        original_quote -> Text,
        quote_lines -> Nullable<Text>,
        analysis -> Nullable<Text>,
        critique -> Nullable<Text>,
        verification -> Nullable<Text>,
        suggested_fix -> Nullable<Text>,
        rationale -> Nullable<Text>,
        until_end_of_sentence -> Bool,
        start_line -> Nullable<BigInt>,
        end_line -> Nullable<BigInt>,
        order_number -> Nullable<BigInt>,
        feedback_exists -> Bool,
        feedback_mark -> Nullable<Bool>,
        feedback_comment -> Nullable<Text>,
        feedback_user -> Nullable<Text>,
        verification_feedback_exists -> Bool,
        verification_feedback_mark -> Nullable<Bool>,
        verification_feedback_comment -> Nullable<Text>,
        verification_feedback_user -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    missing_instances (id) {
        id -> Text,
        error_id -> Text,
        version_id -> Text,
        numeric_id -> BigInt,
        html_id -> Text,
        analysis -> Nullable<Text>,
        critique -> Nullable<Text>,
        verification -> Nullable<Text>,
        suggested_fix -> Nullable<Text>,
        rationale -> Nullable<Text>,
        retrieval -> Text,
        feedback_exists -> Bool,
        feedback_mark -> Nullable<Bool>,
        feedback_comment -> Nullable<Text>,
        feedback_user -> Nullable<Text>,
        verification_feedback_exists -> Bool,
        verification_feedback_mark -> Nullable<Bool>,
        verification_feedback_comment -> Nullable<Text>,
        verification_feedback_user -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    llm_cache (id) {
        id -> Integer,
        messages_hash -> Text,
        response_data -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(versions -> technical_specifications (technical_specification_id));
diesel::joinable!(errors -> versions (version_id));
diesel::joinable!(invalid_instances -> errors (error_id));
diesel::joinable!(missing_instances -> errors (error_id));

diesel::allow_tables_to_appear_in_same_query!(
    technical_specifications,
    versions,
    errors,
    invalid_instances,
    missing_instances,
    llm_cache,
);
