//! Policy Authorization Integration Tests
//!
//! Tests cover user policies, bucket policies, the combination rules and
//! fail-closed behavior on corrupted data or store failures.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bkt_guard::authz::{
        actions, AccessRequest, Authorizer, AuthzError, CombinationRule, InMemoryPolicyStore,
        PolicyAdmin, PolicyAuthorizer, PolicyDocument, PolicyStore, Statement, StoredPolicy,
    };
    use std::sync::Arc;

    // ========================================================================
    // Helper: stores and documents
    // ========================================================================

    fn json(doc: &PolicyDocument) -> String {
        doc.to_json().unwrap()
    }

    fn allow(actions: &[&str], resources: &[&str]) -> String {
        json(&PolicyDocument::new(vec![Statement::allow(actions, resources)]))
    }

    fn deny(actions: &[&str], resources: &[&str]) -> String {
        json(&PolicyDocument::new(vec![Statement::deny(actions, resources)]))
    }

    /// Store with buckets `bucket-a` and `bucket-b`
    async fn store() -> Arc<InMemoryPolicyStore> {
        let store = Arc::new(InMemoryPolicyStore::new());
        store.create_bucket("bucket-a");
        store.create_bucket("bucket-b");
        store
    }

    async fn attach(store: &InMemoryPolicyStore, principal: &str, name: &str, doc: String) {
        store.save_policy(name, doc).await.unwrap();
        store.attach_policy(principal, name);
    }

    fn authorizer(store: Arc<InMemoryPolicyStore>) -> PolicyAuthorizer {
        PolicyAuthorizer::new(store)
    }

    // ========================================================================
    // TEST: Admin Bypass and Defaults
    // ========================================================================

    #[tokio::test]
    async fn test_admin_always_allowed() {
        let store = store().await;
        store
            .save_bucket_policy("bucket-a", deny(&["*"], &["*"]))
            .await
            .unwrap();
        let authz = authorizer(store);

        for action in [
            actions::GET_OBJECT,
            actions::PUT_OBJECT,
            actions::DELETE_BUCKET,
            actions::PUT_BUCKET_POLICY,
        ] {
            let request = AccessRequest::object("root", "bucket-a", "k", action).with_admin(true);
            assert!(authz.authorize(&request).await.allowed, "{}", action);
        }

        // even for buckets that do not exist
        let request =
            AccessRequest::bucket("root", "nowhere", actions::CREATE_BUCKET).with_admin(true);
        assert!(authz.authorize(&request).await.allowed);
    }

    #[tokio::test]
    async fn test_no_policies_denies_everything() {
        let authz = authorizer(store().await);

        for action in [actions::GET_OBJECT, actions::LIST_BUCKET, actions::PUT_OBJECT] {
            let request = AccessRequest::object("alice", "bucket-a", "file", action);
            let authorization = authz.authorize(&request).await;
            assert!(!authorization.allowed, "{}", action);
            assert!(authorization.faults.is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_bucket_denied() {
        let store = store().await;
        attach(&store, "alice", "all", allow(&["*"], &["*"])).await;
        let authz = authorizer(store);

        let request = AccessRequest::object("alice", "ghost", "file", actions::GET_OBJECT);
        assert!(!authz.authorize(&request).await.allowed);
    }

    // ========================================================================
    // TEST: User Policies
    // ========================================================================

    #[tokio::test]
    async fn test_policy_scoped_to_one_bucket() {
        let store = store().await;
        attach(
            &store,
            "alice",
            "read-a",
            allow(&["s3:GetObject"], &["arn:aws:s3:::bucket-a/*"]),
        )
        .await;
        let authz = authorizer(store);

        let other = AccessRequest::object("alice", "bucket-b", "file", actions::GET_OBJECT);
        assert!(!authz.authorize(&other).await.allowed);

        let own = AccessRequest::object("alice", "bucket-a", "file", actions::GET_OBJECT);
        assert!(authz.authorize(&own).await.allowed);

        let write = AccessRequest::object("alice", "bucket-a", "file", actions::PUT_OBJECT);
        assert!(!authz.authorize(&write).await.allowed);
    }

    #[tokio::test]
    async fn test_bucket_level_arn() {
        let store = store().await;
        attach(
            &store,
            "alice",
            "list-a",
            allow(&["s3:ListBucket"], &["arn:aws:s3:::bucket-a"]),
        )
        .await;
        let authz = authorizer(store);

        let list = AccessRequest::bucket("alice", "bucket-a", actions::LIST_BUCKET);
        assert!(authz.authorize(&list).await.allowed);

        // the bucket ARN does not cover its objects
        let get = AccessRequest::object("alice", "bucket-a", "f", actions::LIST_BUCKET);
        assert!(!authz.authorize(&get).await.allowed);
    }

    #[tokio::test]
    async fn test_deny_in_same_document_wins() {
        let store = store().await;
        let doc = PolicyDocument::new(vec![
            Statement::allow(&["s3:*"], &["arn:aws:s3:::bucket-a/*"]),
            Statement::deny(&["s3:DeleteObject"], &["arn:aws:s3:::bucket-a/*"]),
        ]);
        attach(&store, "alice", "mixed", json(&doc)).await;
        let authz = authorizer(store);

        let delete = AccessRequest::object("alice", "bucket-a", "f", actions::DELETE_OBJECT);
        assert!(!authz.authorize(&delete).await.allowed);

        let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
        assert!(authz.authorize(&get).await.allowed);
    }

    #[tokio::test]
    async fn test_explicit_deny_in_any_attached_policy_wins() {
        let store = store().await;
        attach(&store, "alice", "all", allow(&["s3:*"], &["*"])).await;
        attach(
            &store,
            "alice",
            "no-delete",
            deny(&["s3:DeleteObject"], &["*"]),
        )
        .await;
        let authz = authorizer(store);

        let delete = AccessRequest::object("alice", "bucket-a", "f", actions::DELETE_OBJECT);
        assert!(!authz.authorize(&delete).await.allowed);

        // "no-delete" has no statement for PutObject, so it stays neutral
        let put = AccessRequest::object("alice", "bucket-a", "f", actions::PUT_OBJECT);
        assert!(authz.authorize(&put).await.allowed);
    }

    #[tokio::test]
    async fn test_non_matching_attached_policy_is_neutral() {
        for rule in [CombinationRule::StrictDeny, CombinationRule::UnionOfAllows] {
            let store = store().await;
            attach(
                &store,
                "alice",
                "read-a",
                allow(&["s3:GetObject"], &["arn:aws:s3:::bucket-a/*"]),
            )
            .await;
            attach(
                &store,
                "alice",
                "write-b",
                allow(&["s3:PutObject"], &["arn:aws:s3:::bucket-b/*"]),
            )
            .await;
            let authz = authorizer(store).with_rule(rule);

            let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
            let authorization = authz.authorize(&get).await;
            assert!(authorization.allowed, "{:?}", rule);
            assert!(authorization.faults.is_empty());

            // neither policy matches, so nothing grants
            let put = AccessRequest::object("alice", "bucket-a", "f", actions::PUT_OBJECT);
            assert!(!authz.authorize(&put).await.allowed, "{:?}", rule);
        }
    }

    #[tokio::test]
    async fn test_service_wildcard_does_not_cross_services() {
        let store = store().await;
        attach(&store, "alice", "s3-all", allow(&["s3:*"], &["*"])).await;
        let authz = authorizer(store);

        let iam = AccessRequest::bucket("alice", "bucket-a", "iam:GetUser");
        assert!(!authz.authorize(&iam).await.allowed);
    }

    // ========================================================================
    // TEST: Bucket Policies
    // ========================================================================

    #[tokio::test]
    async fn test_bucket_policy_grants_alone() {
        let store = store().await;
        store
            .save_bucket_policy(
                "bucket-a",
                allow(&["s3:GetObject"], &["arn:aws:s3:::bucket-a/*"]),
            )
            .await
            .unwrap();
        let authz = authorizer(store);

        let get = AccessRequest::object("anyone", "bucket-a", "f", actions::GET_OBJECT);
        assert!(authz.authorize(&get).await.allowed);

        let get_b = AccessRequest::object("anyone", "bucket-b", "f", actions::GET_OBJECT);
        assert!(!authz.authorize(&get_b).await.allowed);
    }

    async fn bucket_deny_setup() -> Arc<InMemoryPolicyStore> {
        let store = store().await;
        attach(
            &store,
            "alice",
            "full-a",
            allow(&["s3:*"], &["arn:aws:s3:::bucket-a", "arn:aws:s3:::bucket-a/*"]),
        )
        .await;
        store
            .save_bucket_policy(
                "bucket-a",
                deny(&["s3:DeleteObject"], &["arn:aws:s3:::bucket-a/*"]),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_bucket_deny_beats_user_allow_under_strict_deny() {
        let authz = authorizer(bucket_deny_setup().await);
        assert_eq!(authz.rule(), CombinationRule::StrictDeny);

        let delete = AccessRequest::object("alice", "bucket-a", "f", actions::DELETE_OBJECT);
        assert!(!authz.authorize(&delete).await.allowed);

        // other actions keep flowing from the user policy
        let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
        assert!(authz.authorize(&get).await.allowed);
    }

    #[tokio::test]
    async fn test_user_deny_beats_bucket_allow_under_strict_deny() {
        let store = store().await;
        attach(&store, "alice", "no-put", deny(&["s3:PutObject"], &["*"])).await;
        store
            .save_bucket_policy("bucket-a", allow(&["s3:*"], &["arn:aws:s3:::bucket-a/*"]))
            .await
            .unwrap();
        let authz = authorizer(store);

        let put = AccessRequest::object("alice", "bucket-a", "f", actions::PUT_OBJECT);
        assert!(!authz.authorize(&put).await.allowed);
    }

    #[tokio::test]
    async fn test_bucket_deny_overridden_under_union_of_allows() {
        let authz =
            authorizer(bucket_deny_setup().await).with_rule(CombinationRule::UnionOfAllows);

        let delete = AccessRequest::object("alice", "bucket-a", "f", actions::DELETE_OBJECT);
        assert!(authz.authorize(&delete).await.allowed);

        // a principal with nothing of their own is still denied
        let mallory = AccessRequest::object("mallory", "bucket-a", "f", actions::DELETE_OBJECT);
        assert!(!authz.authorize(&mallory).await.allowed);
    }

    // ========================================================================
    // TEST: Corrupted Data and Store Failures
    // ========================================================================

    #[tokio::test]
    async fn test_corrupted_bucket_policy_falls_back_to_user_policy() {
        let store = store().await;
        attach(
            &store,
            "alice",
            "read-a",
            allow(&["s3:GetObject"], &["arn:aws:s3:::bucket-a/*"]),
        )
        .await;
        store
            .save_bucket_policy("bucket-a", r#"{"Statement":[{"Effect":"Deny""#.into())
            .await
            .unwrap();
        let authz = authorizer(store);

        let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
        let authorization = authz.authorize(&get).await;
        assert!(authorization.allowed);
        assert_eq!(authorization.faults.len(), 1);
        assert!(matches!(
            authorization.faults[0],
            AuthzError::EvaluationFault(_)
        ));

        let put = AccessRequest::object("alice", "bucket-a", "f", actions::PUT_OBJECT);
        assert!(!authz.authorize(&put).await.allowed);
    }

    #[tokio::test]
    async fn test_corrupted_user_policy_is_skipped() {
        let store = store().await;
        attach(&store, "alice", "garbage", "not json at all".into()).await;
        attach(
            &store,
            "alice",
            "read-a",
            allow(&["s3:GetObject"], &["arn:aws:s3:::bucket-a/*"]),
        )
        .await;
        let authz = authorizer(store);

        let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
        let authorization = authz.authorize(&get).await;
        assert!(authorization.allowed);
        assert_eq!(authorization.faults.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupted_user_policy_never_grants() {
        let store = store().await;
        // would allow everything if it were ever parsed leniently
        attach(
            &store,
            "alice",
            "too-many",
            format!(
                r#"{{"Statement":[{}]}}"#,
                vec![r#"{"Effect":"Allow","Action":"*","Resource":"*"}"#; 21].join(",")
            ),
        )
        .await;
        let authz = authorizer(store);

        let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
        let authorization = authz.authorize(&get).await;
        assert!(!authorization.allowed);
        assert_eq!(authorization.faults.len(), 1);
    }

    /// Store that fails every read
    struct BrokenStore;

    #[async_trait]
    impl PolicyStore for BrokenStore {
        async fn policies_for_principal(
            &self,
            _principal: &str,
        ) -> Result<Vec<StoredPolicy>, AuthzError> {
            Err(AuthzError::BackendError("connection reset".into()))
        }

        async fn bucket_exists(&self, _bucket: &str) -> Result<bool, AuthzError> {
            Ok(true)
        }

        async fn bucket_policy(&self, _bucket: &str) -> Result<Option<String>, AuthzError> {
            Err(AuthzError::BackendError("connection reset".into()))
        }

        async fn save_policy(&self, _name: &str, _document: String) -> Result<(), AuthzError> {
            Err(AuthzError::BackendError("read only".into()))
        }

        async fn save_bucket_policy(
            &self,
            _bucket: &str,
            _document: String,
        ) -> Result<(), AuthzError> {
            Err(AuthzError::BackendError("read only".into()))
        }

        async fn delete_bucket_policy(&self, _bucket: &str) -> Result<bool, AuthzError> {
            Err(AuthzError::BackendError("read only".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_denies() {
        let authz = PolicyAuthorizer::new(Arc::new(BrokenStore));

        let get = AccessRequest::object("alice", "bucket-a", "f", actions::GET_OBJECT);
        let authorization = authz.authorize(&get).await;
        assert!(!authorization.allowed);
        assert!(matches!(
            authorization.faults.as_slice(),
            [AuthzError::BackendError(_)]
        ));
    }

    #[tokio::test]
    async fn test_admin_save_surfaces_store_error() {
        let admin = PolicyAdmin::new(Arc::new(BrokenStore));
        let result = admin
            .put_policy("p", &allow(&["s3:GetObject"], &["*"]))
            .await;
        assert!(matches!(result, Err(AuthzError::BackendError(_))));
    }

    // ========================================================================
    // TEST: Admin Write Path Feeds the Authorizer
    // ========================================================================

    #[tokio::test]
    async fn test_policy_written_through_admin_is_enforced() {
        let store = store().await;
        let admin = PolicyAdmin::new(store.clone());
        admin
            .put_policy(
                "read-only",
                &PolicyDocument::read_only().to_json().unwrap(),
            )
            .await
            .unwrap();
        store.attach_policy("bob", "read-only");
        admin
            .put_bucket_policy(
                "bucket-b",
                &PolicyDocument::deny_all().to_json().unwrap(),
            )
            .await
            .unwrap();
        let authz = authorizer(store);

        let get_a = AccessRequest::object("bob", "bucket-a", "f", actions::GET_OBJECT);
        assert!(authz.authorize(&get_a).await.allowed);

        let put_a = AccessRequest::object("bob", "bucket-a", "f", actions::PUT_OBJECT);
        assert!(!authz.authorize(&put_a).await.allowed);

        let get_b = AccessRequest::object("bob", "bucket-b", "f", actions::GET_OBJECT);
        assert!(!authz.authorize(&get_b).await.allowed);
    }
}
