use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnPlans,
    ManageOwnPlans,
    TrackProgress,
    ViewLeaderboard,

    ViewAllPatients,
    ApprovePlans,
    RecommendPlans,

    RegisterUsers,
    EditUserRoles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Member,
    Doctor,
    Admin,
}

static MEMBER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnPlans);
    permissions.insert(Permission::ManageOwnPlans);
    permissions.insert(Permission::TrackProgress);
    permissions.insert(Permission::ViewLeaderboard);

    permissions
});

static DOCTOR_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewLeaderboard);
    permissions.insert(Permission::ViewAllPatients);
    permissions.insert(Permission::ApprovePlans);
    permissions.insert(Permission::RecommendPlans);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(DOCTOR_PERMISSIONS.iter().copied());

    permissions.insert(Permission::RegisterUsers);
    permissions.insert(Permission::EditUserRoles);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Member => &MEMBER_PERMISSIONS,
            Role::Doctor => &DOCTOR_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Member => "member",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "member" => Ok(Role::Member),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
