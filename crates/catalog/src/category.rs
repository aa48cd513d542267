use serde::{Deserialize, Serialize};

use backoffice_core::{CategoryId, DomainError, DomainResult, Entity};

/// Catalog category.
///
/// Categories form a tree. Directories group other categories; products may only
/// be attached to leaf (non-directory) categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub is_directory: bool,
    pub level: u32,
    /// Ancestor names and own name joined with ` - ` (e.g. `Phones - Android`).
    pub full_name: String,
}

impl Category {
    pub fn root(name: impl Into<String>, is_directory: bool) -> DomainResult<Self> {
        let name = clean_name(name)?;
        Ok(Self {
            id: CategoryId::new(),
            full_name: name.clone(),
            name,
            parent_id: None,
            is_directory,
            level: 0,
        })
    }

    pub fn child_of(parent: &Category, name: impl Into<String>, is_directory: bool) -> DomainResult<Self> {
        if !parent.is_directory {
            return Err(DomainError::invariant(format!(
                "category '{}' is not a directory and cannot have children",
                parent.full_name
            )));
        }
        let name = clean_name(name)?;
        Ok(Self {
            id: CategoryId::new(),
            full_name: format!("{} - {}", parent.full_name, name),
            name,
            parent_id: Some(parent.id),
            is_directory,
            level: parent.level + 1,
        })
    }

    /// Whether products can be attached to this category.
    pub fn accepts_products(&self) -> bool {
        !self.is_directory
    }

    /// Case-insensitive match against the name or full name (remote picker search).
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        q.is_empty() || self.full_name.to_lowercase().contains(&q)
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn clean_name(name: impl Into<String>) -> DomainResult<String> {
    let name = name.into().trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation("category name cannot be empty"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_full_name_includes_ancestors() {
        let phones = Category::root("Phones", true).unwrap();
        let android = Category::child_of(&phones, "Android", true).unwrap();
        let flagship = Category::child_of(&android, "Flagship", false).unwrap();

        assert_eq!(flagship.full_name, "Phones - Android - Flagship");
        assert_eq!(flagship.level, 2);
        assert_eq!(flagship.parent_id, Some(android.id));
        assert!(flagship.accepts_products());
        assert!(!android.accepts_products());
    }

    #[test]
    fn leaf_categories_cannot_have_children() {
        let leaf = Category::root("Gift cards", false).unwrap();
        let err = Category::child_of(&leaf, "Digital", false).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(matches!(Category::root("  ", true), Err(DomainError::Validation(_))));
    }

    #[test]
    fn matches_searches_full_name_case_insensitively() {
        let phones = Category::root("Phones", true).unwrap();
        let android = Category::child_of(&phones, "Android", false).unwrap();
        assert!(android.matches("phones"));
        assert!(android.matches("ANDROID"));
        assert!(android.matches(""));
        assert!(!android.matches("laptops"));
    }
}
