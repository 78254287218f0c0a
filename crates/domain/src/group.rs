use serde::{Deserialize, Serialize};

use crate::value_objects::{GroupId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub group_name: String,
    pub group_description: String,
    pub category: String,
    pub owner_id: UserId,
}
