use serde::{Deserialize, Serialize};

/// Role names containing any of these (case-insensitive) grant administrator rights.
const ADMIN_KEYWORDS: [&str; 3] = ["admin", "administrador", "administrator"];
const SUPERVISOR_KEYWORD: &str = "supervisor";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Supervisor,
    Operator,
}

impl ActorRole {
    /// Map a free-text role name from the identity provider to a role.
    ///
    /// Runs once at the request boundary; the engine only sees the resulting variant.
    pub fn from_role_name(role_name: Option<&str>, admin_flag: bool) -> Self {
        if admin_flag {
            return ActorRole::Admin;
        }
        let Some(name) = role_name else {
            return ActorRole::Operator;
        };
        let normalized = name.trim().to_lowercase();
        if normalized.contains(SUPERVISOR_KEYWORD) {
            return ActorRole::Supervisor;
        }
        if ADMIN_KEYWORDS.iter().any(|k| normalized.contains(k)) {
            return ActorRole::Admin;
        }
        ActorRole::Operator
    }

    pub fn can_delete(self) -> bool {
        matches!(self, ActorRole::Admin | ActorRole::Supervisor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Supervisor => "supervisor",
            ActorRole::Operator => "operator",
        }
    }
}

/// Already-authenticated caller identity as handed over by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: Option<i64>, username: Option<String>, role: ActorRole) -> Self {
        Self {
            user_id,
            username,
            role,
        }
    }

    /// An actor with no resolvable identity (e.g. system jobs).
    pub fn anonymous(role: ActorRole) -> Self {
        Self::new(None, None, role)
    }

    pub fn can_delete(&self) -> bool {
        self.role.can_delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_map_by_keyword() {
        assert_eq!(ActorRole::from_role_name(Some("Administrador General"), false), ActorRole::Admin);
        assert_eq!(ActorRole::from_role_name(Some("SYSADMIN"), false), ActorRole::Admin);
        assert_eq!(ActorRole::from_role_name(Some("Supervisor de turno"), false), ActorRole::Supervisor);
        assert_eq!(ActorRole::from_role_name(Some("Operador"), false), ActorRole::Operator);
        assert_eq!(ActorRole::from_role_name(None, false), ActorRole::Operator);
        assert_eq!(ActorRole::from_role_name(Some("Operador"), true), ActorRole::Admin);
    }

    #[test]
    fn only_privileged_roles_delete() {
        assert!(ActorRole::Admin.can_delete());
        assert!(ActorRole::Supervisor.can_delete());
        assert!(!ActorRole::Operator.can_delete());
    }
}
