//! Role analysis for the authenticated user
//!
//! A user's roles are resolved recursively through `rolesInfo` until every
//! entry is a built-in role. Each role lands in one of three sets:
//! - `valid`: built-in and not administrative
//! - `invalid`: administrative, whether built-in or not
//! - `custom`: user-defined, so its privileges cannot be vouched for
//!
//! When the server refuses `rolesInfo`, only the names attached to the user
//! are classified and the evaluation is marked as not exhaustive.

use async_trait::async_trait;
use futures::future::BoxFuture;
use mongodb::Database;
use mongodb::bson::{Bson, Document, doc};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

use crate::error::mongo::{ErrorClass, classify};
use crate::runner::CheckOutcome;

/// Roles that grant administrative privileges
pub const ADMIN_ROLES: [&str; 7] = [
    "userAdminAnyDatabase",
    "dbAdminAnyDatabase",
    "dbAdmin",
    "dbOwner",
    "userAdmin",
    "clusterAdmin",
    "root",
];

/// Nesting limit for role inheritance
const MAX_DEPTH: usize = 32;

/// Whether a role name is administrative
pub fn is_admin_role(name: &str) -> bool {
    ADMIN_ROLES.contains(&name)
}

/// Classified role names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSets {
    pub valid: BTreeSet<String>,
    pub invalid: BTreeSet<String>,
    pub custom: BTreeSet<String>,
}

impl RoleSets {
    /// Add every role of `other`
    pub fn merge(&mut self, other: RoleSets) {
        self.valid.extend(other.valid);
        self.invalid.extend(other.invalid);
        self.custom.extend(other.custom);
    }

    /// Classify a single role
    ///
    /// # Arguments
    /// * `name` - Role name
    /// * `builtin` - Whether the server reports it as built-in
    pub fn classify(name: &str, builtin: bool) -> Self {
        let mut sets = Self::default();
        let target = if is_admin_role(name) {
            &mut sets.invalid
        } else if builtin {
            &mut sets.valid
        } else {
            &mut sets.custom
        };
        target.insert(name.to_string());
        sets
    }
}

/// Failure while expanding a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// The user may not inspect roles
    Unauthorized(String),

    /// Anything else, including malformed replies
    Failed(String),
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::Unauthorized(msg) => write!(f, "Not authorized to inspect roles: {msg}"),
            ExpandError::Failed(msg) => write!(f, "Role expansion failed: {msg}"),
        }
    }
}

impl std::error::Error for ExpandError {}

/// Source of role definitions
#[async_trait]
pub trait RoleExpander: Send + Sync {
    /// Fetch the definitions of a role
    ///
    /// # Arguments
    /// * `role` - Role name
    /// * `db` - Database the role is defined in
    ///
    /// # Returns
    /// * `Result<Vec<Document>, ExpandError>` - Role documents as returned
    ///   by `rolesInfo`
    async fn expand(&self, role: &str, db: &str) -> Result<Vec<Document>, ExpandError>;
}

/// Expands roles with `rolesInfo` on a live database
pub struct DatabaseRoleExpander {
    database: Database,
}

impl DatabaseRoleExpander {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl RoleExpander for DatabaseRoleExpander {
    async fn expand(&self, role: &str, db: &str) -> Result<Vec<Document>, ExpandError> {
        let reply = self
            .database
            .run_command(doc! { "rolesInfo": { "role": role, "db": db } })
            .await
            .map_err(|e| match classify(&e) {
                ErrorClass::Unauthorized => ExpandError::Unauthorized(e.to_string()),
                _ => ExpandError::Failed(e.to_string()),
            })?;

        let roles = reply
            .get_array("roles")
            .map_err(|e| ExpandError::Failed(e.to_string()))?;
        Ok(roles
            .iter()
            .filter_map(Bson::as_document)
            .cloned()
            .collect())
    }
}

/// Result of a role evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEvaluation {
    pub sets: RoleSets,

    /// False when only the user's direct roles could be classified
    pub exhaustive: bool,
}

/// Classify every role reachable from a user document
///
/// # Arguments
/// * `user` - Entry of a `usersInfo` reply
/// * `expander` - Source of role definitions
///
/// # Returns
/// * `Result<RoleEvaluation, ExpandError>` - Classified roles; an
///   authorization refusal degrades to a shallow evaluation instead of
///   failing
pub async fn evaluate_roles(
    user: &Document,
    expander: &dyn RoleExpander,
) -> Result<RoleEvaluation, ExpandError> {
    let node = Bson::Document(user.clone());
    match resolve(&node, expander, 0).await {
        Ok(sets) => Ok(RoleEvaluation {
            sets,
            exhaustive: true,
        }),
        Err(ExpandError::Unauthorized(reason)) => {
            warn!("Falling back to shallow role check: {}", reason);
            Ok(RoleEvaluation {
                sets: shallow(user),
                exhaustive: false,
            })
        }
        Err(e) => Err(e),
    }
}

fn resolve<'a>(
    node: &'a Bson,
    expander: &'a dyn RoleExpander,
    depth: usize,
) -> BoxFuture<'a, Result<RoleSets, ExpandError>> {
    Box::pin(async move {
        if depth > MAX_DEPTH {
            return Err(ExpandError::Failed("role inheritance too deep".to_string()));
        }

        match node {
            Bson::Array(items) => {
                let mut sets = RoleSets::default();
                for item in items {
                    sets.merge(resolve(item, expander, depth + 1).await?);
                }
                Ok(sets)
            }
            Bson::Document(doc) => resolve_document(doc, expander, depth).await,
            other => Err(ExpandError::Failed(format!("unexpected role entry {other}"))),
        }
    })
}

async fn resolve_document(
    doc: &Document,
    expander: &dyn RoleExpander,
    depth: usize,
) -> Result<RoleSets, ExpandError> {
    let Ok(name) = doc.get_str("role") else {
        // A user document: only its role list matters.
        return match doc.get("roles") {
            Some(roles) => resolve(roles, expander, depth + 1).await,
            None => Err(ExpandError::Failed("document has neither role nor roles".to_string())),
        };
    };

    match doc.get_bool("isBuiltin") {
        Ok(builtin) => {
            let mut sets = RoleSets::classify(name, builtin);
            for key in ["roles", "inheritedRoles"] {
                if let Some(children) = doc.get(key) {
                    sets.merge(resolve(children, expander, depth + 1).await?);
                }
            }
            Ok(sets)
        }
        Err(_) => {
            let db = doc.get_str("db").unwrap_or("admin");
            debug!("Expanding role {}@{}", name, db);
            let definitions = expander.expand(name, db).await?;
            if definitions.is_empty() {
                return Err(ExpandError::Failed(format!("role {name}@{db} not found")));
            }
            let node = Bson::Array(definitions.into_iter().map(Bson::Document).collect());
            resolve(&node, expander, depth + 1).await
        }
    }
}

/// Classify the user's direct role names without consulting the server
pub fn shallow(user: &Document) -> RoleSets {
    let mut sets = RoleSets::default();
    let Ok(roles) = user.get_array("roles") else {
        return sets;
    };

    for name in roles
        .iter()
        .filter_map(Bson::as_document)
        .filter_map(|role| role.get_str("role").ok())
    {
        if is_admin_role(name) {
            sets.invalid.insert(name.to_string());
        } else {
            sets.valid.insert(name.to_string());
        }
    }
    sets
}

/// Map an evaluation to a result
///
/// Administrative roles fail the check. A shallow evaluation or any custom
/// role yields a warning. Only an exhaustive evaluation without custom roles
/// passes.
pub fn verdict(evaluation: &RoleEvaluation) -> CheckOutcome {
    let sets = &evaluation.sets;
    if !sets.invalid.is_empty() {
        return CheckOutcome::fail().with_extra(format_set(&sets.invalid));
    }
    if !evaluation.exhaustive {
        return CheckOutcome::warning(format!(
            "Your user's permissions {} didn't allow us to do an exhaustive check.",
            format_set(&sets.valid)
        ));
    }
    if !sets.custom.is_empty() {
        return CheckOutcome::warning(format!(
            "Your user's role set {} seems to be ok, but we couldn't do an exhaustive check.",
            format_set(&sets.valid)
        ));
    }
    CheckOutcome::pass().with_extra(format_set(&sets.valid))
}

/// Render a role set as `[a, b]`
pub fn format_set(set: &BTreeSet<String>) -> String {
    let names: Vec<&str> = set.iter().map(String::as_str).collect();
    format!("[{}]", names.join(", "))
}

/// Databases the user's roles are bound to
pub fn role_databases(user: &Document) -> BTreeSet<String> {
    user.get_array("roles")
        .map(|roles| {
            roles
                .iter()
                .filter_map(Bson::as_document)
                .filter_map(|role| role.get_str("db").ok())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ResultCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory role catalogue that counts lookups
    #[derive(Default)]
    struct FakeExpander {
        roles: HashMap<(String, String), Document>,
        refuse: bool,
        calls: Mutex<usize>,
    }

    impl FakeExpander {
        fn with_role(mut self, name: &str, db: &str, builtin: bool, inherits: &[(&str, &str)]) -> Self {
            let inherited: Vec<Bson> = inherits
                .iter()
                .map(|(role, db)| Bson::Document(doc! { "role": *role, "db": *db }))
                .collect();
            self.roles.insert(
                (name.to_string(), db.to_string()),
                doc! {
                    "role": name,
                    "db": db,
                    "isBuiltin": builtin,
                    "roles": inherited.clone(),
                    "inheritedRoles": inherited,
                },
            );
            self
        }

        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl RoleExpander for FakeExpander {
        async fn expand(&self, role: &str, db: &str) -> Result<Vec<Document>, ExpandError> {
            *self.calls.lock().unwrap() += 1;
            if self.refuse {
                return Err(ExpandError::Unauthorized("not authorized on admin".into()));
            }
            Ok(self
                .roles
                .get(&(role.to_string(), db.to_string()))
                .cloned()
                .into_iter()
                .collect())
        }
    }

    fn user(roles: &[(&str, &str)]) -> Document {
        let roles: Vec<Bson> = roles
            .iter()
            .map(|(role, db)| Bson::Document(doc! { "role": *role, "db": *db }))
            .collect();
        doc! { "user": "alice", "db": "admin", "roles": roles }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_builtin_read_role_passes() {
        let expander = FakeExpander::default().with_role("read", "app", true, &[]);
        let evaluation = evaluate_roles(&user(&[("read", "app")]), &expander)
            .await
            .unwrap();

        assert!(evaluation.exhaustive);
        assert_eq!(evaluation.sets.valid, set(&["read"]));
        let outcome = verdict(&evaluation);
        assert_eq!(outcome.code, ResultCode::Pass);
        assert_eq!(outcome.extra.as_deref(), Some("[read]"));
    }

    #[tokio::test]
    async fn test_db_owner_fails_with_role_name() {
        let expander = FakeExpander::default().with_role("dbOwner", "app", true, &[]);
        let evaluation = evaluate_roles(&user(&[("dbOwner", "app")]), &expander)
            .await
            .unwrap();

        let outcome = verdict(&evaluation);
        assert_eq!(outcome.code, ResultCode::Fail);
        assert!(outcome.extra.unwrap().contains("dbOwner"));
    }

    #[tokio::test]
    async fn test_custom_role_inheriting_admin_is_invalid() {
        let expander = FakeExpander::default()
            .with_role("reporting", "app", false, &[("root", "admin")])
            .with_role("root", "admin", true, &[]);
        let evaluation = evaluate_roles(&user(&[("reporting", "app")]), &expander)
            .await
            .unwrap();

        assert_eq!(evaluation.sets.custom, set(&["reporting"]));
        assert_eq!(evaluation.sets.invalid, set(&["root"]));
        assert_eq!(verdict(&evaluation).code, ResultCode::Fail);
    }

    #[tokio::test]
    async fn test_custom_role_alone_warns() {
        let expander = FakeExpander::default()
            .with_role("reporting", "app", false, &[("read", "app")])
            .with_role("read", "app", true, &[]);
        let evaluation = evaluate_roles(&user(&[("reporting", "app")]), &expander)
            .await
            .unwrap();

        assert!(evaluation.sets.invalid.is_empty());
        assert_eq!(evaluation.sets.valid, set(&["read"]));
        assert_eq!(verdict(&evaluation).code, ResultCode::Warning);
    }

    #[tokio::test]
    async fn test_refused_expansion_falls_back_to_shallow_check() {
        let expander = FakeExpander::refusing();

        let evaluation = evaluate_roles(&user(&[("read", "app")]), &expander)
            .await
            .unwrap();
        assert!(!evaluation.exhaustive);
        assert_eq!(evaluation.sets.valid, set(&["read"]));
        assert_eq!(verdict(&evaluation).code, ResultCode::Warning);

        let evaluation = evaluate_roles(&user(&[("read", "app"), ("root", "admin")]), &expander)
            .await
            .unwrap();
        assert_eq!(verdict(&evaluation).code, ResultCode::Fail);
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let expander = FakeExpander::default()
            .with_role("reporting", "app", false, &[("read", "app")])
            .with_role("read", "app", true, &[]);
        let doc = user(&[("reporting", "app"), ("read", "app")]);

        let first = evaluate_roles(&doc, &expander).await.unwrap();
        let calls = expander.calls();
        let second = evaluate_roles(&doc, &expander).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(expander.calls(), calls * 2);
    }

    #[tokio::test]
    async fn test_user_without_roles_passes_with_empty_set() {
        let expander = FakeExpander::default();
        let evaluation = evaluate_roles(&user(&[]), &expander).await.unwrap();
        assert_eq!(evaluation.sets, RoleSets::default());
        assert_eq!(expander.calls(), 0);
        assert_eq!(verdict(&evaluation).code, ResultCode::Pass);
    }

    #[tokio::test]
    async fn test_unknown_role_is_an_error() {
        let expander = FakeExpander::default();
        let result = evaluate_roles(&user(&[("ghost", "app")]), &expander).await;
        assert!(matches!(result, Err(ExpandError::Failed(_))));
    }

    #[test]
    fn test_every_admin_role_is_listed_separately() {
        for role in [
            "userAdminAnyDatabase",
            "dbAdminAnyDatabase",
            "dbAdmin",
            "dbOwner",
            "userAdmin",
            "clusterAdmin",
            "root",
        ] {
            assert!(is_admin_role(role), "{role} should be administrative");
        }
        assert!(!is_admin_role("userAdminuserAdminAnyDatabase"));
        assert!(!is_admin_role("readWrite"));
    }

    #[test]
    fn test_broad_non_admin_builtins_are_valid() {
        for role in ["readWriteAnyDatabase", "__system", "readAnyDatabase"] {
            let sets = RoleSets::classify(role, true);
            assert!(sets.valid.contains(role), "{role} should be valid");
            assert!(sets.invalid.is_empty());
        }
    }

    #[test]
    fn test_cluster_and_db_admin_fail_the_verdict() {
        for role in ["clusterAdmin", "dbAdmin"] {
            let evaluation = RoleEvaluation {
                sets: RoleSets::classify(role, true),
                exhaustive: true,
            };
            let outcome = verdict(&evaluation);
            assert_eq!(outcome.code, ResultCode::Fail);
            assert!(outcome.extra.unwrap().contains(role));
        }
    }

    #[test]
    fn test_role_databases() {
        let doc = user(&[("read", "app"), ("readWrite", "app")]);
        assert_eq!(role_databases(&doc), set(&["app"]));

        let doc = user(&[("read", "app"), ("read", "reports")]);
        assert_eq!(role_databases(&doc).len(), 2);
    }
}
