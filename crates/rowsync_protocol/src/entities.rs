//! Entity payloads as they travel on the wire.
//!
//! These are the values carried by `put` patch operations and by the
//! arguments of the list/todo mutations.

use serde::{Deserialize, Serialize};

/// A todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    /// List ID.
    pub id: String,
    /// Owning user.
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    /// Display name.
    pub name: String,
}

/// A todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Todo ID.
    pub id: String,
    /// Parent list.
    #[serde(rename = "listID")]
    pub list_id: String,
    /// Todo text.
    pub text: String,
    /// Completion flag.
    pub complete: bool,
    /// Position within the list. Assigned by the server on creation.
    #[serde(default)]
    pub sort: i64,
}

/// Arguments of `updateTodo`: every field but the id is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoUpdate {
    /// Todo ID.
    pub id: String,
    /// New text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// New completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    /// New position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<i64>,
}

impl TodoUpdate {
    /// Creates an update that changes nothing yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the completion flag.
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }

    /// Sets the position.
    pub fn with_sort(mut self, sort: i64) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Applies this update on top of an existing todo.
    pub fn apply_to(&self, todo: &mut Todo) {
        if let Some(text) = &self.text {
            todo.text.clone_from(text);
        }
        if let Some(complete) = self.complete {
            todo.complete = complete;
        }
        if let Some(sort) = self.sort {
            todo.sort = sort;
        }
    }
}
