use bson::doc;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::database::models::{collections, Role, User};
use crate::database::reference::ref_in;
use crate::database::{DatabaseError, DocumentStore, FindQuery};

/// Local account behind an identity-provider subject.
pub async fn find_user(store: &dyn DocumentStore, ext_id: &str) -> Result<Option<User>, DatabaseError> {
    Ok(store
        .find_one(collections::USER, doc! { "ext_id": ext_id })
        .await?
        .as_ref()
        .and_then(User::from_document))
}

/// What a subject may do: the admin flag plus the union of its roles'
/// actions and options.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Permissions {
    #[serde(serialize_with = "crate::api::format::serialize_oid_opt")]
    pub id: Option<bson::oid::ObjectId>,
    pub ext_id: Option<String>,
    pub admin: bool,
    pub roles: Vec<Role>,
    pub all_actions: BTreeSet<String>,
    pub all_options: BTreeSet<String>,
}

impl Permissions {
    /// Permissions of `ext_id`; an unknown subject gets the empty set.
    pub async fn load(store: &dyn DocumentStore, ext_id: &str) -> Result<Self, DatabaseError> {
        let Some(user) = find_user(store, ext_id).await? else {
            return Ok(Self::default());
        };

        let roles: Vec<Role> = if user.roles.is_empty() {
            Vec::new()
        } else {
            let query = FindQuery::new(ref_in("_id", &user.roles)).sort(doc! { "_id": 1 });
            store
                .find(collections::ROLE, query)
                .await?
                .iter()
                .filter_map(Role::from_document)
                .collect()
        };

        Ok(Self::from_parts(user, roles))
    }

    pub fn from_parts(user: User, roles: Vec<Role>) -> Self {
        let all_actions = roles.iter().flat_map(|r| r.actions.iter().cloned()).collect();
        let all_options = roles.iter().flat_map(|r| r.options.iter().cloned()).collect();
        Self {
            id: Some(user.id),
            ext_id: user.ext_id,
            admin: user.admin,
            roles,
            all_actions,
            all_options,
        }
    }

    /// Admins pass every check. Otherwise every requested action and option
    /// must be held (`require_all`) or at least one of each requested kind.
    /// An empty request list is satisfied.
    pub fn has_permissions(&self, actions: &[&str], options: &[&str], require_all: bool) -> bool {
        if self.admin {
            return true;
        }
        let check = |wanted: &[&str], held: &BTreeSet<String>| {
            if wanted.is_empty() {
                return true;
            }
            if require_all {
                wanted.iter().all(|w| held.contains(*w))
            } else {
                wanted.iter().any(|w| held.contains(*w))
            }
        };
        check(actions, &self.all_actions) && check(options, &self.all_options)
    }
}
