//! Policy Validation Integration Tests
//!
//! Tests cover the size and statement caps, rejection ordering and that
//! documents rejected on write never reach evaluation.

#[cfg(test)]
mod tests {
    use bkt_guard::authz::validator::{MAX_POLICY_BYTES, MAX_STATEMENTS};
    use bkt_guard::authz::{
        validate_policy_document, AuthzError, Effect, InMemoryPolicyStore, PolicyAdmin,
        PolicyStore, PolicyValidationError,
    };
    use std::sync::Arc;

    fn statement(i: usize) -> String {
        format!(
            r#"{{"Sid":"S{}","Effect":"Allow","Action":["s3:GetObject"],"Resource":["arn:aws:s3:::bucket/*"]}}"#,
            i
        )
    }

    fn document(statements: usize) -> String {
        let body: Vec<String> = (0..statements).map(statement).collect();
        format!(
            r#"{{"Version":"2012-10-17","Statement":[{}]}}"#,
            body.join(",")
        )
    }

    // ========================================================================
    // TEST: Size and Count Caps
    // ========================================================================

    #[test]
    fn test_twenty_statements_accepted() {
        let doc = validate_policy_document(&document(MAX_STATEMENTS)).unwrap();
        assert_eq!(doc.statements.len(), 20);
    }

    #[test]
    fn test_twenty_one_statements_rejected() {
        assert_eq!(
            validate_policy_document(&document(21)).unwrap_err(),
            PolicyValidationError::TooManyStatements { count: 21, max: 20 }
        );
    }

    #[test]
    fn test_oversized_document_rejected() {
        let padding = "a".repeat(MAX_POLICY_BYTES);
        let raw = format!(
            r#"{{"Statement":[{{"Sid":"{}","Effect":"Allow","Action":"*","Resource":"*"}}]}}"#,
            padding
        );
        assert!(raw.len() > 10240);

        match validate_policy_document(&raw).unwrap_err() {
            PolicyValidationError::PolicyTooLarge { size, max } => {
                assert_eq!(size, raw.len());
                assert_eq!(max, 10240);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_exactly_max_size_passes_size_check() {
        let base = r#"{"Statement":[{"Effect":"Allow","Action":"*","Resource":"*"}]}"#;
        let raw = format!("{}{}", base, " ".repeat(MAX_POLICY_BYTES - base.len()));
        assert_eq!(raw.len(), MAX_POLICY_BYTES);
        assert!(validate_policy_document(&raw).is_ok());
    }

    // ========================================================================
    // TEST: Rejection Ordering
    // ========================================================================

    #[test]
    fn test_first_failing_statement_reported() {
        let raw = r#"{"Statement":[
            {"Effect":"Allow","Action":"s3:GetObject","Resource":"*"},
            {"Effect":"Permit","Action":"bad action","Resource":""}
        ]}"#;
        assert_eq!(
            validate_policy_document(raw).unwrap_err(),
            PolicyValidationError::InvalidEffect {
                index: 1,
                effect: "Permit".into()
            }
        );
    }

    #[test]
    fn test_action_checked_before_resource() {
        let raw = r#"{"Statement":[{"Effect":"Deny","Action":"s3","Resource":"../x"}]}"#;
        assert!(matches!(
            validate_policy_document(raw),
            Err(PolicyValidationError::InvalidActionSyntax { index: 0, .. })
        ));
    }

    #[test]
    fn test_messages_are_actionable() {
        let raw = r#"{"Statement":[{"Effect":"Allow","Action":"s3:GetObject","Resource":"arn:aws:s3"}]}"#;
        let err = validate_policy_document(raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            "statement 0: invalid resource 'arn:aws:s3': invalid ARN format"
        );
    }

    #[test]
    fn test_single_string_action_and_resource() {
        let doc = validate_policy_document(
            r#"{"Statement":[{"Effect":"Deny","Action":"s3:DeleteObject","Resource":"arn:aws:s3:::b/*"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.statements[0].effect, Effect::Deny);
        assert_eq!(doc.statements[0].actions, vec!["s3:DeleteObject"]);
        assert_eq!(doc.statements[0].resources, vec!["arn:aws:s3:::b/*"]);
    }

    // ========================================================================
    // TEST: Rejected Documents Are Never Stored
    // ========================================================================

    #[tokio::test]
    async fn test_rejected_bucket_policy_not_persisted() {
        let store = Arc::new(InMemoryPolicyStore::new());
        store.create_bucket("bucket");
        let admin = PolicyAdmin::new(store.clone());

        let err = admin
            .put_bucket_policy("bucket", &document(21))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthzError::InvalidPolicy(PolicyValidationError::TooManyStatements { .. })
        ));
        assert_eq!(store.bucket_policy("bucket").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replacing_bucket_policy() {
        let store = Arc::new(InMemoryPolicyStore::new());
        store.create_bucket("bucket");
        let admin = PolicyAdmin::new(store.clone());

        admin.put_bucket_policy("bucket", &document(1)).await.unwrap();
        admin.put_bucket_policy("bucket", &document(3)).await.unwrap();

        let stored = store.bucket_policy("bucket").await.unwrap().unwrap();
        assert_eq!(validate_policy_document(&stored).unwrap().statements.len(), 3);
    }
}
