//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use stockroom::model::Person;
use stockroom::{App, MemoryStore};

pub fn person(id_number: &str, name: &str, department: &str) -> Person {
    Person {
        id_number: id_number.to_string(),
        name: name.to_string(),
        department: Some(department.to_string()),
        email: Some(format!("{}@example.com", id_number.to_lowercase())),
        phone: None,
        title: None,
    }
}

/// Directory used across tests: two people share "May", one "Kai".
pub fn directory() -> Vec<Person> {
    vec![
        person("A100", "May Chen", "IT"),
        person("A200", "May Lin", "Finance"),
        person("B300", "Kai Wu", "IT"),
    ]
}

/// In-memory app over [`directory`]; the store is returned for inspection.
pub fn memory_app() -> (Arc<MemoryStore>, App) {
    let store = Arc::new(MemoryStore::with_people(directory()));
    let app = App::new(store.clone());
    (store, app)
}
