use serde::Serialize;

/// Upper bound on folder nesting followed when resolving a trail.
pub const MAX_DEPTH: i32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Breadcrumb {
    pub id: Option<i32>,
    pub name: String,
}

impl Breadcrumb {
    pub fn root() -> Self {
        Breadcrumb { id: None, name: "Root".to_string() }
    }
}

/// Prepends the root entry to the ancestors of a folder, which must already be
/// ordered outermost first and end with the folder itself.
pub fn build_trail(ancestors: Vec<Breadcrumb>) -> Vec<Breadcrumb> {
    let mut trail = Vec::with_capacity(ancestors.len() + 1);
    trail.push(Breadcrumb::root());
    trail.extend(ancestors);
    trail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crumb(id: i32, name: &str) -> Breadcrumb {
        Breadcrumb { id: Some(id), name: name.to_string() }
    }

    #[test]
    fn root_only_for_top_level() {
        assert_eq!(build_trail(vec![]), vec![Breadcrumb::root()]);
    }

    #[test]
    fn trail_runs_root_to_current() {
        let trail = build_trail(vec![crumb(1, "Arsip"), crumb(4, "2024"), crumb(9, "Maret")]);
        let names: Vec<&str> = trail.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Arsip", "2024", "Maret"]);
        assert_eq!(trail[0].id, None);
        assert_eq!(trail.last().unwrap().id, Some(9));
    }

    #[test]
    fn root_serializes_null_id() {
        let json = serde_json::to_value(Breadcrumb::root()).unwrap();
        assert_eq!(json, serde_json::json!({ "id": null, "name": "Root" }));
    }
}
