//! Alert recipient resolution for a device.

use uuid::Uuid;

use crate::models::DeviceUsers;

// ---

/// Resolve the set of users to notify for one device.
///
/// The owner is always first and is never duplicated, even when they also
/// appear in the association set. The result is never empty: a device
/// always has an owner.
pub fn resolve(device: &DeviceUsers) -> Vec<Uuid> {
    // ---
    let mut recipients = vec![device.owner_id];
    for &user_id in &device.associated_user_ids {
        if !recipients.contains(&user_id) {
            recipients.push(user_id);
        }
    }
    recipients
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn create_test_device(owner: Uuid, associated: Vec<Uuid>) -> DeviceUsers {
        // ---
        DeviceUsers {
            device_id: Uuid::new_v4(),
            owner_id: owner,
            associated_user_ids: associated,
        }
    }

    #[test]
    fn test_owner_only_device_resolves_to_owner() {
        // ---
        let owner = Uuid::new_v4();
        let recipients = resolve(&create_test_device(owner, vec![]));
        assert_eq!(recipients, vec![owner]);
    }

    #[test]
    fn test_associated_users_are_added() {
        // ---
        let owner = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let recipients = resolve(&create_test_device(owner, vec![a, b]));
        assert_eq!(recipients, vec![owner, a, b]);
    }

    #[test]
    fn test_owner_in_association_set_is_not_duplicated() {
        // ---
        let owner = Uuid::new_v4();
        let a = Uuid::new_v4();
        let recipients = resolve(&create_test_device(owner, vec![a, owner, a]));
        assert_eq!(recipients, vec![owner, a]);
    }
}
