//! Role-based menu composition.

use serde::Serialize;

use crate::config::RouteConfig;
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub path: &'static str,
    pub label: &'static str,
}

const ADMIN_MENU: &[NavEntry] = &[
    NavEntry { path: "/admin/dashboard", label: "Overview" },
    NavEntry { path: "/admin/tickets", label: "Ticket CRM" },
    NavEntry { path: "/admin/users", label: "Customers" },
    NavEntry { path: "/admin/payments", label: "Payments" },
];

const CUSTOMER_MENU: &[NavEntry] = &[
    NavEntry { path: "/dashboard", label: "Home" },
    NavEntry { path: "/dashboard/tickets", label: "My Tickets" },
    NavEntry { path: "/dashboard/billing", label: "Billing" },
];

/// Ordered menu entries for a role
pub fn compose(role: Role) -> &'static [NavEntry] {
    match role {
        Role::Admin => ADMIN_MENU,
        Role::Customer => CUSTOMER_MENU,
    }
}

/// Where a role lands after signing in
pub fn landing_path(role: Role, routes: &RouteConfig) -> &str {
    match role {
        Role::Admin => &routes.admin_landing,
        Role::Customer => &routes.customer_landing,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub path: &'static str,
    pub label: &'static str,
    pub active: bool,
}

/// Menu for `role` with the entry for `current_path` marked active
pub fn menu(role: Role, current_path: &str) -> Vec<MenuItem> {
    compose(role)
        .iter()
        .map(|entry| MenuItem {
            path: entry.path,
            label: entry.label,
            active: entry.path == current_path,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_menu_in_order() {
        let labels: Vec<_> = compose(Role::Admin).iter().map(|e| e.label).collect();
        assert_eq!(labels, ["Overview", "Ticket CRM", "Customers", "Payments"]);
        assert!(compose(Role::Admin).iter().all(|e| e.path.starts_with("/admin/")));
    }

    #[test]
    fn customer_menu_in_order() {
        let paths: Vec<_> = compose(Role::Customer).iter().map(|e| e.path).collect();
        assert_eq!(paths, ["/dashboard", "/dashboard/tickets", "/dashboard/billing"]);
    }

    #[test]
    fn landing_depends_on_role() {
        let routes = RouteConfig::default();
        assert_eq!(landing_path(Role::Admin, &routes), "/admin/dashboard");
        assert_eq!(landing_path(Role::Customer, &routes), "/dashboard");
    }

    #[test]
    fn marks_exact_match_active() {
        let items = menu(Role::Customer, "/dashboard/tickets");
        let active: Vec<_> = items.iter().filter(|i| i.active).map(|i| i.label).collect();
        assert_eq!(active, ["My Tickets"]);
    }
}
