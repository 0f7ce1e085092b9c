//! Single-role allow-list checks
//!
//! `SUPER_ADMIN` passes every check, even one with an empty allow-list.

use crate::config::SUPER_ADMIN_ROLE;
use crate::db::schemas::UserSnapshot;

/// Whether `role` is in `allowed_roles` or is the super-admin role
pub fn is_authorized(role: Option<&str>, allowed_roles: &[&str]) -> bool {
    match role {
        Some(role) => role == SUPER_ADMIN_ROLE || allowed_roles.contains(&role),
        None => false,
    }
}

pub fn is_super_admin(user: &UserSnapshot) -> bool {
    is_authorized(user.role.as_deref(), &[])
}

/// A caller may act on their own record, or on any record as super-admin
pub fn can_act_on(caller: &UserSnapshot, username: &str) -> bool {
    caller.username == username || is_super_admin(caller)
}
