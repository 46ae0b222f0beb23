use super::*;
use crate::context::{ContextType, PageFacts};
use crate::error::{StoreError, TransportError, VerificationError};
use crate::test_utils::{
    canvas_context, signed_request, tab_context, test_config, MockOracle, RecordingHook,
    TEST_APP_ID, TEST_APP_SECRET, TEST_CANVAS_URL,
};
use serde_json::json;

struct Harness {
    pipeline: Pipeline,
    store: Arc<MemoryContextStore>,
    oracle: MockOracle,
    hook: RecordingHook,
}

fn harness(routes: StaticRequirements) -> Harness {
    harness_with(routes, test_config(), MockOracle::new())
}

fn harness_with(
    routes: StaticRequirements,
    config: ApplicationConfig,
    oracle: MockOracle,
) -> Harness {
    let store = Arc::new(MemoryContextStore::new());
    let hook = RecordingHook::new();
    let pipeline = Pipeline::builder(config)
        .shared_store(store.clone())
        .oracle(oracle.clone())
        .requirements(routes)
        .hook(hook.clone())
        .build()
        .unwrap();
    Harness {
        pipeline,
        store,
        oracle,
        hook,
    }
}

fn session() -> SessionId {
    SessionId::new("session-1")
}

fn request(route: &str) -> GateRequest {
    GateRequest::new(session(), route)
}

async fn seed(h: &Harness, context: Context) {
    h.store.save(&session(), TEST_APP_ID, context).await.unwrap();
}

fn config_with_policy(policy: VerificationFailurePolicy) -> ApplicationConfig {
    ApplicationConfig::builder(TEST_APP_ID, TEST_APP_SECRET)
        .canvas_url(TEST_CANVAS_URL)
        .scopes(["email", "publish_stream"])
        .verification_failure(policy)
        .build()
        .unwrap()
}

// ===== Ordering =====

#[test]
fn test_gate_order_is_fixed() {
    assert_eq!(
        Gate::ORDER,
        [
            Gate::Context,
            Gate::Authentication,
            Gate::Permission,
            Gate::PageAdmin
        ]
    );
    let names: Vec<&str> = Gate::ORDER.iter().map(Gate::as_str).collect();
    assert_eq!(names, ["context", "authentication", "permission", "page_admin"]);
}

#[tokio::test]
async fn test_gates_run_in_order() {
    let h = harness_with(
        StaticRequirements::new().route(
            "/all",
            Requirements::none()
                .contexts([ContextType::Tab])
                .authorization()
                .permissions(["read"])
                .page_admin(),
        ),
        test_config(),
        MockOracle::new().with_scopes("tok", [("read", true)]),
    );
    seed(&h, tab_context(Some("tok"), true)).await;

    h.pipeline.authorize(request("/all")).await.unwrap();

    let passed: Vec<Gate> = h
        .hook
        .events()
        .into_iter()
        .filter_map(|e| match e {
            GateEvent::GatePassed { gate, .. } => Some(gate),
            _ => None,
        })
        .collect();
    assert_eq!(passed, Gate::ORDER.to_vec());
}

// ===== Skipping =====

#[tokio::test]
async fn test_undeclared_route_skips_every_gate_without_external_calls() {
    let h = harness(StaticRequirements::new());

    let authorized = h.pipeline.authorize(request("/anything")).await.unwrap();

    assert!(authorized.context().is_none());
    assert!(!authorized.credentials().is_user());
    assert_eq!(h.oracle.call_count(), 0);

    let skipped = h
        .hook
        .events()
        .iter()
        .filter(|e| matches!(e, GateEvent::GateSkipped { .. }))
        .count();
    assert_eq!(skipped, 4);
}

#[tokio::test]
async fn test_no_permissions_declared_passes_with_zero_scopes() {
    let h = harness(StaticRequirements::new().route("/auth", Requirements::none().authorization()));
    seed(&h, canvas_context(Some("tok"))).await;

    h.pipeline.authorize(request("/auth")).await.unwrap();

    assert_eq!(h.oracle.call_count(), 0);
}

#[test]
fn test_each_check_skips_when_undeclared() {
    let h = harness(StaticRequirements::new());
    let none = Requirements::none();
    let mut credentials = RequestCredentials::application("app");

    assert_eq!(h.pipeline.check_context(&none, None).unwrap(), GateOutcome::Skipped);
    assert_eq!(
        h.pipeline
            .check_authentication(&none, None, &mut credentials)
            .unwrap(),
        GateOutcome::Skipped
    );
    assert_eq!(h.pipeline.check_page_admin(&none, None).unwrap(), GateOutcome::Skipped);
    assert!(!credentials.is_user());
}

// ===== Context gate =====

#[test]
fn test_context_gate_exhaustive_over_known_types() {
    let h = harness(StaticRequirements::new());
    let tab = tab_context(None, false);
    let canvas = canvas_context(None);

    let cases: Vec<(Vec<ContextType>, &Context, bool)> = vec![
        (vec![ContextType::Tab], &tab, true),
        (vec![ContextType::Tab], &canvas, false),
        (vec![ContextType::Canvas], &canvas, true),
        (vec![ContextType::Canvas], &tab, false),
        (vec![ContextType::Canvas, ContextType::Tab], &tab, true),
        (vec![ContextType::Canvas, ContextType::Tab], &canvas, true),
        (vec![], &canvas, false),
    ];

    for (allowed, context, accepted) in cases {
        let requirements = Requirements::none().contexts(allowed.clone());
        let result = h.pipeline.check_context(&requirements, Some(context));
        if accepted {
            assert_eq!(result.unwrap(), GateOutcome::Passed, "{:?}", allowed);
        } else {
            assert!(
                matches!(result, Err(GateError::Context(ContextError::NotAllowed { .. }))),
                "{:?}",
                allowed
            );
        }
    }
}

#[test]
fn test_context_gate_without_context() {
    let h = harness(StaticRequirements::new());
    let requirements = Requirements::none().contexts([ContextType::Canvas]);

    let err = h.pipeline.check_context(&requirements, None).unwrap_err();
    assert_eq!(err, GateError::Context(ContextError::Missing));
}

#[tokio::test]
async fn test_scenario_tab_route_rejects_canvas_context() {
    let h = harness(
        StaticRequirements::new().route("/tab", Requirements::none().contexts([ContextType::Tab])),
    );
    seed(&h, canvas_context(None)).await;

    let err = h.pipeline.authorize(request("/tab")).await.unwrap_err();

    assert_eq!(
        err,
        GateError::Context(ContextError::NotAllowed {
            actual: ContextType::Canvas,
            allowed: vec![ContextType::Tab],
        })
    );
    assert!(h.hook.events().contains(&GateEvent::GateFailed {
        gate: Gate::Context,
        kind: "context",
        message: err.to_string(),
    }));
}

// ===== Authentication gate =====

#[tokio::test]
async fn test_scenario_authorization_required() {
    let h = harness(StaticRequirements::new().route("/me", Requirements::none().authorization()));

    seed(&h, canvas_context(None)).await;
    let err = h.pipeline.authorize(request("/me")).await.unwrap_err();
    assert_eq!(err, GateError::Authorization(AuthorizationError::NotAuthorized));

    seed(&h, canvas_context(Some("user-token"))).await;
    let authorized = h.pipeline.authorize(request("/me")).await.unwrap();
    assert!(authorized.credentials().is_user());
    assert_eq!(authorized.access_token(), "user-token");
    assert!(h.hook.events().contains(&GateEvent::TokenSwitched {
        user_id: Some("1001".into())
    }));
}

#[tokio::test]
async fn test_authorization_without_any_context() {
    let h = harness(StaticRequirements::new().route("/me", Requirements::none().authorization()));

    let err = h.pipeline.authorize(request("/me")).await.unwrap_err();

    assert_eq!(err, GateError::Authorization(AuthorizationError::NotAuthorized));
}

#[tokio::test]
async fn test_credentials_keep_app_token_without_authentication_gate() {
    let h = harness(StaticRequirements::new().route("/open", Requirements::none()));
    seed(&h, canvas_context(Some("user-token"))).await;

    let authorized = h.pipeline.authorize(request("/open")).await.unwrap();

    assert!(!authorized.credentials().is_user());
    assert_eq!(authorized.access_token(), h.pipeline.config().app_access_token());
}

#[test]
fn test_failed_authentication_keeps_app_token() {
    let h = harness(StaticRequirements::new());
    let mut credentials = RequestCredentials::application("app");

    let result = h.pipeline.check_authentication(
        &Requirements::none().authorization(),
        Some(&canvas_context(None)),
        &mut credentials,
    );

    assert!(result.is_err());
    assert_eq!(credentials.access_token(), "app");
}

// ===== Permission gate =====

#[tokio::test]
async fn test_scenario_missing_permission() {
    let oracle = MockOracle::new().with_scopes("tok", [("read", true)]);
    let h = harness_with(
        StaticRequirements::new().route(
            "/post",
            Requirements::none().permissions(["publish", "read"]),
        ),
        test_config(),
        oracle,
    );
    seed(&h, canvas_context(Some("tok"))).await;

    let err = h.pipeline.authorize(request("/post")).await.unwrap_err();

    assert_eq!(
        err,
        GateError::Permission {
            missing: vec!["publish".into()]
        }
    );
    assert_eq!(h.oracle.tokens_seen(), vec!["tok".to_string()]);
}

#[tokio::test]
async fn test_every_missing_scope_is_reported() {
    let oracle = MockOracle::new().with_scopes("tok", [("read", true), ("email", false)]);
    let h = harness_with(StaticRequirements::new(), test_config(), oracle);
    let requirements = Requirements::none().permissions(["publish", "read", "email", "offline"]);

    let err = h
        .pipeline
        .check_permissions(&requirements, Some(&canvas_context(Some("tok"))))
        .await
        .unwrap_err();

    assert_eq!(
        err.missing_permissions().unwrap(),
        &["publish".to_string(), "email".into(), "offline".into()]
    );
    let message = err.to_string();
    for scope in ["publish", "email", "offline"] {
        assert!(message.contains(scope), "{}", message);
    }
}

#[tokio::test]
async fn test_all_scopes_granted_passes() {
    let oracle = MockOracle::new().with_scopes("tok", [("read", true), ("publish", true)]);
    let h = harness_with(StaticRequirements::new(), test_config(), oracle);

    let outcome = h
        .pipeline
        .check_permissions(
            &Requirements::none().permissions(["publish", "read"]),
            Some(&canvas_context(Some("tok"))),
        )
        .await
        .unwrap();

    assert_eq!(outcome, GateOutcome::Passed);
}

#[tokio::test]
async fn test_empty_permission_list_is_a_real_check() {
    let h = harness(StaticRequirements::new());
    let requirements = Requirements::none().permissions(Vec::<String>::new());

    let outcome = h
        .pipeline
        .check_permissions(&requirements, Some(&canvas_context(Some("tok"))))
        .await
        .unwrap();
    assert_eq!(outcome, GateOutcome::Passed);
    assert_eq!(h.oracle.call_count(), 1);

    let err = h
        .pipeline
        .check_permissions(&requirements, Some(&canvas_context(None)))
        .await
        .unwrap_err();
    assert_eq!(err, GateError::Authorization(AuthorizationError::NoAccessGrant));
}

#[tokio::test]
async fn test_permission_check_without_grant() {
    let h = harness(
        StaticRequirements::new().route("/post", Requirements::none().permissions(["publish"])),
    );
    seed(&h, canvas_context(None)).await;

    let err = h.pipeline.authorize(request("/post")).await.unwrap_err();

    assert_eq!(err, GateError::Authorization(AuthorizationError::NoAccessGrant));
    assert_eq!(h.oracle.call_count(), 0);
}

#[tokio::test]
async fn test_oracle_failure_propagates_unchanged() {
    let oracle = MockOracle::new().failing(TransportError::Unavailable("down".into()));
    let h = harness_with(
        StaticRequirements::new().route("/post", Requirements::none().permissions(["publish"])),
        test_config(),
        oracle,
    );
    seed(&h, canvas_context(Some("tok"))).await;

    let err = h.pipeline.authorize(request("/post")).await.unwrap_err();

    assert_eq!(err, GateError::Transport(TransportError::Unavailable("down".into())));
    assert_eq!(h.oracle.call_count(), 1);
}

#[tokio::test]
async fn test_permissions_are_queried_fresh_every_time() {
    let oracle = MockOracle::new().with_scopes("tok", [("read", true)]);
    let h = harness_with(
        StaticRequirements::new().route("/read", Requirements::none().permissions(["read"])),
        test_config(),
        oracle,
    );
    seed(&h, canvas_context(Some("tok"))).await;

    h.pipeline.authorize(request("/read")).await.unwrap();
    h.pipeline.authorize(request("/read")).await.unwrap();

    assert_eq!(h.oracle.call_count(), 2);
}

#[tokio::test]
async fn test_authorize_with_explicit_requirements_ignores_route_table() {
    let h = harness(StaticRequirements::new().route("/me", Requirements::none()));
    seed(&h, canvas_context(None)).await;

    let err = h
        .pipeline
        .authorize_with(request("/me"), Requirements::none().authorization())
        .await
        .unwrap_err();

    assert_eq!(err, GateError::Authorization(AuthorizationError::NotAuthorized));
}

// ===== Page-admin gate =====

#[tokio::test]
async fn test_page_admin_passes_for_admin() {
    let h = harness(StaticRequirements::new().route("/manage", Requirements::none().page_admin()));
    seed(&h, tab_context(None, true)).await;

    h.pipeline.authorize(request("/manage")).await.unwrap();
}

#[tokio::test]
async fn test_page_admin_rejects_non_admin() {
    let h = harness(StaticRequirements::new().route("/manage", Requirements::none().page_admin()));
    seed(&h, tab_context(None, false)).await;

    let err = h.pipeline.authorize(request("/manage")).await.unwrap_err();

    assert_eq!(err, GateError::Role);
    assert!(err.is_routine());
}

#[test]
fn test_page_admin_outside_tab_is_fatal_configuration_error() {
    let h = harness(StaticRequirements::new());
    // Page facts claiming admin are dropped outside a tab and must not matter.
    let canvas = Context::new(
        ContextType::Canvas,
        None,
        Some(PageFacts::new("42").admin(true)),
    );

    let err = h
        .pipeline
        .check_page_admin(&Requirements::none().page_admin(), Some(&canvas))
        .unwrap_err();

    assert!(matches!(err, GateError::Configuration(_)));
    assert!(err.is_fatal());
    assert_ne!(err, GateError::Role);
}

#[test]
fn test_page_admin_without_context() {
    let h = harness(StaticRequirements::new());

    let err = h
        .pipeline
        .check_page_admin(&Requirements::none().page_admin(), None)
        .unwrap_err();

    assert_eq!(err, GateError::Context(ContextError::Missing));
}

#[test]
fn test_tab_without_page_facts_is_not_admin() {
    let h = harness(StaticRequirements::new());
    let tab = Context::new(ContextType::Tab, None, None);

    let err = h
        .pipeline
        .check_page_admin(&Requirements::none().page_admin(), Some(&tab))
        .unwrap_err();

    assert_eq!(err, GateError::Role);
}

// ===== Short-circuiting =====

#[tokio::test]
async fn test_first_failure_stops_the_pipeline() {
    let h = harness(StaticRequirements::new().route(
        "/tab-post",
        Requirements::none()
            .contexts([ContextType::Tab])
            .permissions(["publish"]),
    ));
    // Fails the context gate, and would fail the permission gate too.
    seed(&h, canvas_context(Some("tok"))).await;

    let err = h.pipeline.authorize(request("/tab-post")).await.unwrap_err();

    assert!(matches!(err, GateError::Context(_)));
    assert_eq!(h.oracle.call_count(), 0);

    let gates_seen: Vec<Gate> = h
        .hook
        .events()
        .into_iter()
        .filter_map(|e| match e {
            GateEvent::GateSkipped { gate }
            | GateEvent::GatePassed { gate, .. }
            | GateEvent::GateFailed { gate, .. } => Some(gate),
            _ => None,
        })
        .collect();
    assert_eq!(gates_seen, vec![Gate::Context]);
}

#[tokio::test]
async fn test_authentication_failure_skips_permission_query() {
    let h = harness(StaticRequirements::new().route(
        "/post",
        Requirements::none().authorization().permissions(["publish"]),
    ));
    seed(&h, canvas_context(None)).await;

    let err = h.pipeline.authorize(request("/post")).await.unwrap_err();

    assert_eq!(err, GateError::Authorization(AuthorizationError::NotAuthorized));
    assert_eq!(h.oracle.call_count(), 0);
}

// ===== Context resolution =====

#[tokio::test]
async fn test_signed_request_is_resolved_and_stored() {
    let h = harness(StaticRequirements::new());
    let raw = signed_request(&json!({
        "algorithm": "HMAC-SHA256",
        "user_id": "1001",
        "oauth_token": "fresh-token",
        "page": {"id": "42", "liked": true, "admin": false}
    }));

    let authorized = h
        .pipeline
        .authorize(request("/").with_signed_request(raw))
        .await
        .unwrap();

    let context = authorized.context().unwrap();
    assert!(context.is_tab());
    assert_eq!(context.user_token(), Some("fresh-token"));

    let stored = h.store.load(&session(), TEST_APP_ID).await.unwrap().unwrap();
    assert_eq!(&stored, context);
    assert!(h.hook.events().contains(&GateEvent::ContextResolved {
        app_id: TEST_APP_ID.into(),
        context_type: ContextType::Tab,
    }));
}

#[tokio::test]
async fn test_stored_context_is_read_back_without_envelope() {
    let h = harness(StaticRequirements::new().route("/me", Requirements::none().authorization()));
    let raw = signed_request(&json!({"algorithm": "HMAC-SHA256", "oauth_token": "tok"}));

    h.pipeline
        .authorize(request("/").with_signed_request(raw))
        .await
        .unwrap();
    let authorized = h.pipeline.authorize(request("/me")).await.unwrap();

    assert_eq!(authorized.access_token(), "tok");
}

#[tokio::test]
async fn test_fresh_envelope_replaces_stored_context() {
    let h = harness(StaticRequirements::new());
    seed(&h, canvas_context(Some("old"))).await;
    let raw = signed_request(&json!({"algorithm": "HMAC-SHA256", "oauth_token": "new"}));

    let context = h
        .pipeline
        .resolve_context(&session(), Some(&raw))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(context.user_token(), Some("new"));
}

#[tokio::test]
async fn test_contexts_are_scoped_per_session() {
    let h = harness(StaticRequirements::new());
    seed(&h, canvas_context(Some("tok"))).await;

    let other = h
        .pipeline
        .resolve_context(&SessionId::new("session-2"), None)
        .await
        .unwrap();

    assert!(other.is_none());
}

#[tokio::test]
async fn test_bad_envelope_rejected_and_prior_context_kept() {
    let h = harness(StaticRequirements::new());
    seed(&h, canvas_context(Some("old"))).await;

    let err = h
        .pipeline
        .authorize(request("/").with_signed_request("bogus.envelope"))
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Verification(_)));
    let stored = h.store.load(&session(), TEST_APP_ID).await.unwrap().unwrap();
    assert_eq!(stored.user_token(), Some("old"));
    assert!(h
        .hook
        .events()
        .iter()
        .any(|e| matches!(e, GateEvent::ContextVerificationFailed { .. })));
}

#[tokio::test]
async fn test_forged_envelope_is_signature_mismatch() {
    let h = harness(StaticRequirements::new());
    let forged = HmacForger::sign(&json!({"algorithm": "HMAC-SHA256", "oauth_token": "x"}));

    let err = h
        .pipeline
        .resolve_context(&session(), Some(&forged))
        .await
        .unwrap_err();

    assert_eq!(err, GateError::Verification(VerificationError::SignatureMismatch));
    assert!(h.store.load(&session(), TEST_APP_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_policy_drops_prior_context() {
    let h = harness_with(
        StaticRequirements::new(),
        config_with_policy(VerificationFailurePolicy::Invalidate),
        MockOracle::new(),
    );
    seed(&h, canvas_context(Some("old"))).await;

    let err = h
        .pipeline
        .resolve_context(&session(), Some("bogus.envelope"))
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Verification(_)));
    assert!(h.store.load(&session(), TEST_APP_ID).await.unwrap().is_none());
    assert!(h.hook.events().contains(&GateEvent::ContextInvalidated {
        app_id: TEST_APP_ID.into()
    }));
}

#[tokio::test]
async fn test_keep_stale_policy_serves_prior_context() {
    let h = harness_with(
        StaticRequirements::new().route("/me", Requirements::none().authorization()),
        config_with_policy(VerificationFailurePolicy::KeepStale),
        MockOracle::new(),
    );
    seed(&h, canvas_context(Some("old"))).await;

    let authorized = h
        .pipeline
        .authorize(request("/me").with_signed_request("bogus.envelope"))
        .await
        .unwrap();

    assert_eq!(authorized.access_token(), "old");
    assert!(h.hook.events().contains(&GateEvent::ContextRetained {
        app_id: TEST_APP_ID.into(),
        context_type: Some(ContextType::Canvas),
    }));
}

#[tokio::test]
async fn test_store_failure_propagates() {
    struct BrokenStore;

    #[async_trait::async_trait]
    impl ContextStore for BrokenStore {
        async fn load(&self, _: &SessionId, _: &str) -> Result<Option<Context>, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
        async fn save(&self, _: &SessionId, _: &str, _: Context) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
        async fn remove(&self, _: &SessionId, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
        async fn clear_session(&self, _: &SessionId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    let pipeline = Pipeline::builder(test_config())
        .store(BrokenStore)
        .oracle(MockOracle::new())
        .build()
        .unwrap();

    let err = pipeline.authorize(request("/")).await.unwrap_err();
    assert_eq!(err, GateError::Store(StoreError::Unavailable("offline".into())));
}

// ===== Authorization URL =====

#[test]
fn test_authorization_url_requests_full_scope_list() {
    let h = harness(StaticRequirements::new());

    let url = h.pipeline.authorization_url(None).unwrap();
    let params: std::collections::HashMap<String, String> =
        url.query_pairs().into_owned().collect();

    assert_eq!(params["client_id"], TEST_APP_ID);
    assert_eq!(params["redirect_uri"], TEST_CANVAS_URL);
    assert_eq!(params["scope"], "email,publish_stream,read_stream");
}

#[test]
fn test_authorization_url_with_custom_redirect() {
    let h = harness(StaticRequirements::new());

    let url = h
        .pipeline
        .authorization_url(Some("https://example.com/after-login"))
        .unwrap();
    assert!(url
        .query_pairs()
        .any(|(k, v)| k == "redirect_uri" && v == "https://example.com/after-login"));

    let err = h.pipeline.authorization_url(Some("/relative")).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_authorize_redirect_uses_configured_mode() {
    let config = ApplicationConfig::builder("1", "s")
        .canvas_url("https://apps.facebook.com/x/")
        .redirect_mode(crate::login::RedirectMode::TopFrame)
        .build()
        .unwrap();
    let h = harness_with(StaticRequirements::new(), config, MockOracle::new());

    let redirect = h.pipeline.authorize_redirect(None).unwrap();

    assert_eq!(redirect.mode(), crate::login::RedirectMode::TopFrame);
    assert!(redirect.location().starts_with(crate::login::DEFAULT_DIALOG_URL));
}

// ===== Builder =====

#[cfg(not(feature = "graph"))]
#[test]
fn test_builder_requires_oracle_without_graph() {
    let err = Pipeline::builder(test_config()).build().unwrap_err();
    assert!(err.is_fatal());
}

/// Signs envelopes with a secret the test application does not use.
struct HmacForger;

impl HmacForger {
    fn sign(payload: &serde_json::Value) -> String {
        crate::context::HmacSignedRequestVerifier::new("not-the-app-secret")
            .sign(payload)
            .unwrap()
    }
}
