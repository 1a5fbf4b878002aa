//! End-to-end engine tests against an in-memory control plane.
//!
//! The mock applies mutations synchronously but still hands back
//! asynchronous operation handles, so the full wait-then-re-read path
//! is exercised. All tests run with paused time; poll pacing and retry
//! backoff advance instantly.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use strato_cloud::resource::{ResourceEntity, ResourceSpec};
use strato_cloud::{
    AccountRole, ApiError, ApiResult, AsyncOperation, CloudService, CreateResponse, ListRequest,
    ListResponse, MutationResponse, Namespace, NamespaceSpec, OperationClient, ResourceClient,
    StatusCode, User, UserSpec,
};
use strato_reconcile::{
    ErrorPolicy, ReconcileConfig, ReconcileError, ReconcileOutcome, Reconciler,
};

/// Test-only mutability the production entity trait does not expose.
trait TestEntity: ResourceEntity {
    fn with_version(id: String, spec: Self::Spec, version: String) -> Self;
    fn apply(&mut self, spec: Self::Spec, version: String);
}

impl TestEntity for Namespace {
    fn with_version(id: String, spec: NamespaceSpec, version: String) -> Self {
        Self {
            id,
            spec,
            resource_version: version,
        }
    }

    fn apply(&mut self, spec: NamespaceSpec, version: String) {
        self.spec = spec;
        self.resource_version = version;
    }
}

impl TestEntity for User {
    fn with_version(id: String, spec: UserSpec, version: String) -> Self {
        Self {
            id,
            spec,
            resource_version: version,
        }
    }

    fn apply(&mut self, spec: UserSpec, version: String) {
        self.spec = spec;
        self.resource_version = version;
    }
}

/// Scripted async-operation status endpoint. Each registered operation
/// holds a sequence of states; polls pop the sequence and the last
/// state repeats.
#[derive(Default)]
struct OpLog {
    scripts: Mutex<HashMap<String, VecDeque<AsyncOperation>>>,
    next_id: AtomicUsize,
    polls: AtomicUsize,
}

impl OpLog {
    fn register(&self, states: Vec<AsyncOperation>) -> String {
        let id = format!("op-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let states = states
            .into_iter()
            .map(|mut op| {
                op.id = id.clone();
                op
            })
            .collect();
        self.scripts.lock().unwrap().insert(id.clone(), states);
        id
    }

    fn poll(&self, id: &str) -> ApiResult<AsyncOperation> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock().unwrap();
        let states = scripts
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("operation {id} not found")))?;
        if states.len() > 1 {
            Ok(states.pop_front().unwrap())
        } else {
            Ok(states.front().cloned().unwrap())
        }
    }
}

/// In-memory store for one resource kind.
struct MockStore<E: TestEntity> {
    entities: Mutex<Vec<E>>,
    ops: Arc<OpLog>,
    page_size: usize,
    next_version: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    // Scripts keyed by natural key, consumed on first use.
    fail_create: Mutex<HashMap<String, StatusCode>>,
    fail_update: Mutex<HashMap<String, StatusCode>>,
    operation_states: Mutex<HashMap<String, Vec<AsyncOperation>>>,
}

impl<E: TestEntity> MockStore<E> {
    fn new(ops: Arc<OpLog>) -> Self {
        Self {
            entities: Mutex::new(Vec::new()),
            ops,
            page_size: 100,
            next_version: AtomicUsize::new(2),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_create: Mutex::new(HashMap::new()),
            fail_update: Mutex::new(HashMap::new()),
            operation_states: Mutex::new(HashMap::new()),
        }
    }

    fn seed(&self, id: &str, spec: E::Spec) {
        self.entities.lock().unwrap().push(E::with_version(
            id.to_string(),
            spec,
            "v1".to_string(),
        ));
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entities
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.natural_key() == key)
    }

    fn mutation_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    fn fail_create_with(&self, key: &str, code: StatusCode) {
        self.fail_create.lock().unwrap().insert(key.to_string(), code);
    }

    fn fail_update_with(&self, key: &str, code: StatusCode) {
        self.fail_update.lock().unwrap().insert(key.to_string(), code);
    }

    fn script_operation(&self, key: &str, states: Vec<AsyncOperation>) {
        self.operation_states
            .lock()
            .unwrap()
            .insert(key.to_string(), states);
    }

    fn operation_for(&self, key: &str) -> AsyncOperation {
        let states = self
            .operation_states
            .lock()
            .unwrap()
            .remove(key)
            .unwrap_or_else(|| vec![AsyncOperation::fulfilled("placeholder")]);
        AsyncOperation::pending(self.ops.register(states))
    }

    fn bump_version(&self) -> String {
        format!("v{}", self.next_version.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl<E: TestEntity> ResourceClient for MockStore<E> {
    type Entity = E;

    async fn get(&self, id: &str) -> ApiResult<Option<E>> {
        let entities = self.entities.lock().unwrap();
        Ok(entities.iter().find(|e| e.id() == id).cloned())
    }

    async fn list(&self, request: ListRequest) -> ApiResult<ListResponse<E>> {
        let entities = self.entities.lock().unwrap();
        let filtered: Vec<E> = entities
            .iter()
            .filter(|e| {
                request
                    .natural_key
                    .as_deref()
                    .is_none_or(|key| e.natural_key() == key)
            })
            .cloned()
            .collect();
        let start = match &request.page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ApiError::status(StatusCode::InvalidArgument, "bad page token"))?,
            None => 0,
        };
        let end = filtered.len().min(start + self.page_size);
        let next_page_token = (end < filtered.len()).then(|| end.to_string());
        Ok(ListResponse {
            entities: filtered[start..end].to_vec(),
            next_page_token,
        })
    }

    async fn create(&self, spec: E::Spec) -> ApiResult<CreateResponse> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let key = spec.natural_key().to_string();
        if let Some(code) = self.fail_create.lock().unwrap().remove(&key) {
            return Err(ApiError::status(code, format!("create of {key:?} rejected")));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.entities.lock().unwrap().push(E::with_version(
            id.clone(),
            spec,
            "v1".to_string(),
        ));
        Ok(CreateResponse {
            id,
            async_operation: Some(self.operation_for(&key)),
        })
    }

    async fn update(
        &self,
        id: &str,
        spec: E::Spec,
        resource_version: &str,
    ) -> ApiResult<MutationResponse> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let key = spec.natural_key().to_string();
        if let Some(code) = self.fail_update.lock().unwrap().remove(&key) {
            return Err(ApiError::status(code, format!("update of {key:?} rejected")));
        }
        let version = self.bump_version();
        {
            let mut entities = self.entities.lock().unwrap();
            let entity = entities
                .iter_mut()
                .find(|e| e.id() == id)
                .ok_or_else(|| ApiError::not_found(format!("{id} not found")))?;
            if entity.resource_version() != resource_version {
                return Err(ApiError::failed_precondition(
                    "entity was modified concurrently",
                ));
            }
            entity.apply(spec, version);
        }
        Ok(MutationResponse {
            async_operation: Some(self.operation_for(&key)),
        })
    }

    async fn delete(&self, id: &str, resource_version: &str) -> ApiResult<MutationResponse> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut entities = self.entities.lock().unwrap();
        let position = entities
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| ApiError::not_found(format!("{id} not found")))?;
        if entities[position].resource_version() != resource_version {
            return Err(ApiError::failed_precondition(
                "entity was modified concurrently",
            ));
        }
        entities.remove(position);
        Ok(MutationResponse::default())
    }
}

struct MockCloud {
    namespaces: MockStore<Namespace>,
    users: MockStore<User>,
    ops: Arc<OpLog>,
}

impl MockCloud {
    fn new() -> Self {
        let ops = Arc::new(OpLog::default());
        Self {
            namespaces: MockStore::new(ops.clone()),
            users: MockStore::new(ops.clone()),
            ops,
        }
    }
}

#[async_trait]
impl OperationClient for MockCloud {
    async fn get_operation(&self, id: &str) -> ApiResult<AsyncOperation> {
        self.ops.poll(id)
    }
}

impl CloudService for MockCloud {
    fn namespaces(&self) -> &dyn ResourceClient<Entity = Namespace> {
        &self.namespaces
    }

    fn users(&self) -> &dyn ResourceClient<Entity = User> {
        &self.users
    }

    fn operations(&self) -> &dyn OperationClient {
        self
    }
}

fn namespace_spec(name: &str, retention_days: u16) -> NamespaceSpec {
    NamespaceSpec {
        name: name.to_string(),
        regions: vec!["eu-west-1".to_string()],
        retention_days,
    }
}

fn user_spec(email: &str, role: AccountRole) -> UserSpec {
    UserSpec {
        email: email.to_string(),
        account_role: role,
        namespace_permissions: BTreeMap::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_when_absent() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(cloud.clone());

    let result = reconciler
        .reconcile_namespace(namespace_spec("prod", 30))
        .await
        .unwrap();

    assert_eq!(result.outcome, ReconcileOutcome::Created);
    assert_eq!(result.entity.spec.name, "prod");
    assert!(!result.entity.resource_version.is_empty());
    assert!(cloud.namespaces.contains_key("prod"));
    assert_eq!(cloud.namespaces.creates.load(Ordering::SeqCst), 1);
    // The mutation handle was polled to its terminal state.
    assert!(cloud.ops.polls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_on_spec_drift() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-1", namespace_spec("prod", 7));
    let reconciler = Reconciler::new(cloud.clone());

    let result = reconciler
        .reconcile_namespace(namespace_spec("prod", 30))
        .await
        .unwrap();

    assert_eq!(result.outcome, ReconcileOutcome::Updated);
    assert_eq!(result.entity.id, "ns-1");
    assert_eq!(result.entity.spec.retention_days, 30);
    assert_ne!(result.entity.resource_version, "v1");
    assert_eq!(cloud.namespaces.updates.load(Ordering::SeqCst), 1);
    assert_eq!(cloud.namespaces.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_run_is_idempotent() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(cloud.clone());
    let specs = vec![namespace_spec("prod", 30), namespace_spec("staging", 7)];

    let first = reconciler.reconcile_namespaces(specs.clone()).await.unwrap();
    assert!(first.iter().all(|r| r.outcome == ReconcileOutcome::Created));
    let mutations_after_first = cloud.namespaces.mutation_count();

    let second = reconciler.reconcile_namespaces(specs).await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.iter().all(|r| r.outcome == ReconcileOutcome::Unchanged));
    assert_eq!(cloud.namespaces.mutation_count(), mutations_after_first);
}

#[tokio::test(start_paused = true)]
async fn test_batch_covers_specs_then_unaccounted() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-a", namespace_spec("alpha", 30));
    cloud.namespaces.seed("ns-c", namespace_spec("charlie", 30));
    let reconciler = Reconciler::new(cloud.clone());

    let results = reconciler
        .reconcile_namespaces(vec![namespace_spec("alpha", 30), namespace_spec("bravo", 7)])
        .await
        .unwrap();

    // One result per spec in input order, then the unaccounted entity.
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].entity.spec.name, "alpha");
    assert_eq!(results[0].outcome, ReconcileOutcome::Unchanged);
    assert_eq!(results[1].entity.spec.name, "bravo");
    assert_eq!(results[1].outcome, ReconcileOutcome::Created);
    assert_eq!(results[2].entity.spec.name, "charlie");
    assert_eq!(results[2].outcome, ReconcileOutcome::Unaccounted);
    // Unaccounted without the delete flag means untouched.
    assert_eq!(cloud.namespaces.deletes.load(Ordering::SeqCst), 0);
    assert!(cloud.namespaces.contains_key("charlie"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_unaccounted_when_requested() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-a", namespace_spec("alpha", 30));
    cloud.namespaces.seed("ns-c", namespace_spec("charlie", 30));
    let reconciler = Reconciler::with_config(
        cloud.clone(),
        ReconcileConfig::default().with_delete_unaccounted(true),
    );

    let results = reconciler
        .reconcile_namespaces(vec![namespace_spec("alpha", 30), namespace_spec("bravo", 7)])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].outcome, ReconcileOutcome::Unchanged);
    assert_eq!(results[1].outcome, ReconcileOutcome::Created);
    assert_eq!(results[2].entity.spec.name, "charlie");
    assert_eq!(results[2].outcome, ReconcileOutcome::Deleted);
    assert_eq!(cloud.namespaces.deletes.load(Ordering::SeqCst), 1);
    assert!(!cloud.namespaces.contains_key("charlie"));
    assert!(cloud.namespaces.contains_key("alpha"));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_is_isolated_in_batch() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-a", namespace_spec("alpha", 7));
    cloud
        .namespaces
        .fail_update_with("alpha", StatusCode::FailedPrecondition);
    let reconciler = Reconciler::new(cloud.clone());

    let results = reconciler
        .reconcile_namespaces(vec![namespace_spec("alpha", 30), namespace_spec("bravo", 7)])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].outcome, ReconcileOutcome::Error);
    let message = results[0].error.as_deref().unwrap();
    assert!(message.contains("failed_precondition"), "unexpected error: {message}");
    // The failed entity keeps its pre-mutation snapshot.
    assert_eq!(results[0].entity.spec.retention_days, 7);
    // The rest of the batch is unaffected.
    assert_eq!(results[1].outcome, ReconcileOutcome::Created);
    assert!(cloud.namespaces.contains_key("bravo"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_operation_surfaces_reason() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.script_operation(
        "prod",
        vec![AsyncOperation::failed("placeholder", "region quota exceeded")],
    );
    let reconciler = Reconciler::new(cloud.clone());

    let result = reconciler
        .reconcile_namespace(namespace_spec("prod", 30))
        .await
        .unwrap();

    assert_eq!(result.outcome, ReconcileOutcome::Error);
    let message = result.error.as_deref().unwrap();
    assert!(message.contains("region quota exceeded"), "unexpected error: {message}");
    // The stub snapshot carries the id the create returned.
    assert!(!result.entity.id.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pending_operation_polls_until_fulfilled() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.script_operation(
        "prod",
        vec![
            AsyncOperation::pending("placeholder").with_check_duration(Duration::from_millis(50)),
            AsyncOperation::pending("placeholder").with_check_duration(Duration::from_millis(50)),
            AsyncOperation::fulfilled("placeholder"),
        ],
    );
    let reconciler = Reconciler::new(cloud.clone());

    let result = reconciler
        .reconcile_namespace(namespace_spec("prod", 30))
        .await
        .unwrap();

    assert_eq!(result.outcome, ReconcileOutcome::Created);
    assert_eq!(cloud.ops.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_natural_key_is_never_mutated() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-1", namespace_spec("prod", 7));
    cloud.namespaces.seed("ns-2", namespace_spec("prod", 30));
    let reconciler = Reconciler::with_config(
        cloud.clone(),
        ReconcileConfig::default().with_delete_unaccounted(true),
    );

    let results = reconciler
        .reconcile_namespaces(vec![namespace_spec("prod", 30)])
        .await
        .unwrap();

    // The duplicates are consumed by the spec's error result; neither
    // is updated, deleted, or reported unaccounted.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, ReconcileOutcome::Error);
    let message = results[0].error.as_deref().unwrap();
    assert!(message.contains("multiple"), "unexpected error: {message}");
    assert_eq!(cloud.namespaces.mutation_count(), 0);
    assert!(cloud.namespaces.contains_key("prod"));
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_lookup_fails_single_entity_without_mutation() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-1", namespace_spec("prod", 7));
    cloud.namespaces.seed("ns-2", namespace_spec("prod", 30));
    let reconciler = Reconciler::new(cloud.clone());

    let result = reconciler
        .reconcile_namespace(namespace_spec("prod", 30))
        .await
        .unwrap();

    assert_eq!(result.outcome, ReconcileOutcome::Error);
    assert_eq!(cloud.namespaces.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_spec_rejected_before_any_call() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(cloud.clone());

    let mut bad = namespace_spec("prod", 30);
    bad.regions.clear();
    let error = reconciler.reconcile_namespace(bad).await.unwrap_err();

    assert!(matches!(error, ReconcileError::InvalidSpec(_)));
    assert_eq!(cloud.namespaces.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_spec_in_batch_is_recorded_not_fatal() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(cloud.clone());

    let mut bad = namespace_spec("broken", 30);
    bad.retention_days = 0;
    let results = reconciler
        .reconcile_namespaces(vec![bad, namespace_spec("prod", 30)])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].outcome, ReconcileOutcome::Error);
    assert!(results[0].error.as_deref().unwrap().contains("retention_days"));
    assert_eq!(results[1].outcome, ReconcileOutcome::Created);
}

#[tokio::test(start_paused = true)]
async fn test_fail_fast_stops_batch_and_skips_unaccounted() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-a", namespace_spec("alpha", 7));
    cloud.namespaces.seed("ns-c", namespace_spec("charlie", 30));
    cloud
        .namespaces
        .fail_update_with("alpha", StatusCode::PermissionDenied);
    let reconciler = Reconciler::with_config(
        cloud.clone(),
        ReconcileConfig::default()
            .with_delete_unaccounted(true)
            .with_error_policy(ErrorPolicy::FailFast),
    );

    let results = reconciler
        .reconcile_namespaces(vec![namespace_spec("alpha", 30), namespace_spec("bravo", 7)])
        .await
        .unwrap();

    // Only the failed entity's result is returned; "bravo" was never
    // attempted and "charlie" was neither deleted nor reported.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, ReconcileOutcome::Error);
    assert_eq!(cloud.namespaces.creates.load(Ordering::SeqCst), 0);
    assert_eq!(cloud.namespaces.deletes.load(Ordering::SeqCst), 0);
    assert!(cloud.namespaces.contains_key("charlie"));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_returns_error() {
    let cloud = Arc::new(MockCloud::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let reconciler = Reconciler::new(cloud.clone()).with_cancellation(cancel);

    let error = reconciler
        .reconcile_namespaces(vec![namespace_spec("prod", 30)])
        .await
        .unwrap_err();

    assert!(matches!(error, ReconcileError::RunCancelled));
    assert_eq!(cloud.namespaces.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_listing_follows_pagination() {
    // Force several pages.
    let ops = Arc::new(OpLog::default());
    let cloud = Arc::new(MockCloud {
        namespaces: MockStore {
            page_size: 2,
            ..MockStore::new(ops.clone())
        },
        users: MockStore::new(ops.clone()),
        ops,
    });
    for i in 0..5 {
        cloud
            .namespaces
            .seed(&format!("ns-{i}"), namespace_spec(&format!("team-{i}"), 30));
    }
    let reconciler = Reconciler::new(cloud.clone());

    let all = reconciler.list_all_namespaces().await.unwrap();
    assert_eq!(all.len(), 5);

    let specs = (0..5).map(|i| namespace_spec(&format!("team-{i}"), 30)).collect();
    let results = reconciler.reconcile_namespaces(specs).await.unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.outcome == ReconcileOutcome::Unchanged));
}

#[tokio::test(start_paused = true)]
async fn test_lookup_helpers() {
    let cloud = Arc::new(MockCloud::new());
    cloud.namespaces.seed("ns-1", namespace_spec("prod", 30));
    let reconciler = Reconciler::new(cloud.clone());

    let found = reconciler.get_namespace_with_name("prod").await.unwrap();
    assert_eq!(found.unwrap().id, "ns-1");
    assert!(reconciler.get_namespace_with_name("absent").await.unwrap().is_none());
    assert!(reconciler.get_user_with_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_user_reconciliation_round() {
    let cloud = Arc::new(MockCloud::new());
    let reconciler = Reconciler::new(cloud.clone());

    let created = reconciler
        .reconcile_user(user_spec("alice@example.com", AccountRole::Developer))
        .await
        .unwrap();
    assert_eq!(created.outcome, ReconcileOutcome::Created);

    let mut promoted = user_spec("alice@example.com", AccountRole::Admin);
    promoted
        .namespace_permissions
        .insert("prod".to_string(), strato_cloud::NamespacePermission::Write);
    let updated = reconciler.reconcile_user(promoted.clone()).await.unwrap();
    assert_eq!(updated.outcome, ReconcileOutcome::Updated);
    assert_eq!(updated.entity.spec, promoted);

    let fetched = reconciler
        .get_user_with_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.spec.account_role, AccountRole::Admin);
}
