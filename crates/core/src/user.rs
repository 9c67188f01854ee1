//! Customer placing an order.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    /// Shipping address.
    pub address: String,
}

impl User {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl ValueObject for User {}
