use serde::{Deserialize, Serialize};

/// A directory entry. `id_number` is the identifier other records point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id_number: String,
    pub name: String,
    pub department: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Job title.
    pub title: Option<String>,
}

impl Person {
    /// Case-insensitive substring match on the name, as the directory
    /// search defines it.
    pub fn name_contains(&self, fragment: &str) -> bool {
        self.name.to_lowercase().contains(&fragment.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str) -> Person {
        Person {
            id_number: "A1".to_string(),
            name: name.to_string(),
            department: None,
            email: None,
            phone: None,
            title: None,
        }
    }

    #[test]
    fn test_name_contains_ignores_case() {
        assert!(person("May Chen").name_contains("may"));
        assert!(person("May Chen").name_contains("CHEN"));
        assert!(person("Jamaya").name_contains("may"));
        assert!(!person("Mei Lin").name_contains("may"));
    }

    #[test]
    fn test_title_is_serialized() {
        let mut engineer = person("Kai Wu");
        engineer.title = Some("Engineer".to_string());
        let value = serde_json::to_value(&engineer).unwrap();
        assert_eq!(value["title"], "Engineer");
        assert!(serde_json::to_value(person("May Chen")).unwrap()["title"].is_null());
    }
}
