use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::value_objects::enums::permissions::Permission;

/// Set of permissions stored as a bitset over `Permission`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet(u32);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(permissions: &[Permission]) -> Self {
        permissions.iter().fold(Self::empty(), |set, p| set.with(*p))
    }

    pub fn with(self, permission: Permission) -> Self {
        Self(self.0 | permission.bit())
    }

    pub fn union(self, other: PermissionSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn is_superset_of(&self, other: &PermissionSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.contains(*p))
    }

    pub fn to_names(&self) -> Vec<String> {
        self.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Parses stored permission names. Unknown names are rejected rather than
    /// skipped so a typo can never silently narrow or widen access.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        names.iter().try_fold(Self::empty(), |set, name| {
            Permission::from_str(name.as_ref())
                .map(|p| set.with(p))
                .ok_or_else(|| format!("unknown permission: {}", name.as_ref()))
        })
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, p| set.with(p))
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let permissions: Vec<Permission> = self.iter().collect();
        permissions.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let permissions = Vec::<Permission>::deserialize(deserializer)?;
        Ok(permissions.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_membership() {
        let a = PermissionSet::of(&[Permission::ViewSubscription]);
        let b = PermissionSet::of(&[Permission::ManagePlan]);
        let both = a.union(b);
        assert!(both.contains(Permission::ViewSubscription));
        assert!(both.contains(Permission::ManagePlan));
        assert!(!both.contains(Permission::ManageRoles));
        assert!(both.is_superset_of(&a));
        assert!(!a.is_superset_of(&both));
    }

    #[test]
    fn names_round_trip_and_reject_unknown() {
        let set = PermissionSet::of(&[Permission::ManageSeats, Permission::ViewBilling]);
        let names = set.to_names();
        assert_eq!(names, vec!["view_billing", "manage_seats"]);
        assert_eq!(PermissionSet::from_names(&names).unwrap(), set);

        let err = PermissionSet::from_names(&["manage_seats", "root"]).unwrap_err();
        assert!(err.contains("root"));
    }

    #[test]
    fn serde_rejects_unknown_permission() {
        let parsed: PermissionSet = serde_json::from_str(r#"["manage_plan"]"#).unwrap();
        assert!(parsed.contains(Permission::ManagePlan));
        assert!(serde_json::from_str::<PermissionSet>(r#"["superuser"]"#).is_err());
    }
}
