//! Roles, permission strings and the role-to-permission table.

/// Permission string constants
pub mod consts {
    pub const CART_MANAGE: &str = "cart:manage";
    pub const PRODUCTS_READ: &str = "products:read";
    pub const PRODUCTS_MANAGE: &str = "products:manage";
    /// Checkout, own order history, tracking and cancellation
    pub const ORDERS_OWN: &str = "orders:own";
    /// Staff order listing and status changes
    pub const ORDERS_MANAGE: &str = "orders:manage";
}

/// Role names carried in the `roles` claim
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const MARKETER: &str = "marketer";
    pub const USER: &str = "user";
}

const CUSTOMER_PERMISSIONS: &[&str] = &[
    consts::CART_MANAGE,
    consts::PRODUCTS_READ,
    consts::ORDERS_OWN,
];

const STAFF_PERMISSIONS: &[&str] = &[
    consts::CART_MANAGE,
    consts::PRODUCTS_READ,
    consts::PRODUCTS_MANAGE,
    consts::ORDERS_OWN,
    consts::ORDERS_MANAGE,
];

/// Admins and marketers operate the back office.
pub fn is_staff_role(role: &str) -> bool {
    role == roles::ADMIN || role == roles::MARKETER
}

/// Permissions granted by a role. Unknown roles get the customer set.
pub fn role_permissions(role: &str) -> &'static [&'static str] {
    if is_staff_role(role) {
        STAFF_PERMISSIONS
    } else {
        CUSTOMER_PERMISSIONS
    }
}

/// `resource:*` and `*` grants imply the specific permission.
pub fn is_permission_implied(granted: &str, required: &str) -> bool {
    if granted == required || granted == "*" {
        return true;
    }
    match granted.strip_suffix(":*") {
        Some(resource) => required
            .split_once(':')
            .map_or(false, |(required_resource, _)| required_resource == resource),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_roles_can_manage_orders() {
        assert!(role_permissions(roles::ADMIN).contains(&consts::ORDERS_MANAGE));
        assert!(role_permissions(roles::MARKETER).contains(&consts::ORDERS_MANAGE));
        assert!(!role_permissions(roles::USER).contains(&consts::ORDERS_MANAGE));
        assert!(role_permissions("unknown").contains(&consts::CART_MANAGE));
    }

    #[test]
    fn wildcards_imply_resource_permissions() {
        assert!(is_permission_implied("orders:*", consts::ORDERS_MANAGE));
        assert!(is_permission_implied("*", consts::PRODUCTS_MANAGE));
        assert!(!is_permission_implied("orders:*", consts::PRODUCTS_MANAGE));
        assert!(!is_permission_implied("orders:own", consts::ORDERS_MANAGE));
    }
}
