//! Conjunctive metadata filters translated to SQL
//!
//! Every clause is ANDed; an empty filter matches everything.

use crate::types::MemoryFilter;

/// Accumulates WHERE clauses and their bound parameters
pub struct FilterSql {
    pub conditions: Vec<String>,
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl FilterSql {
    pub fn build(filter: &MemoryFilter) -> Self {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?".to_string());
            params.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(ref user) = filter.owner_user_id {
            conditions.push("owner_user_id = ?".to_string());
            params.push(Box::new(user.clone()));
        }
        if let Some(ref world) = filter.owner_world_id {
            conditions.push("owner_world_id = ?".to_string());
            params.push(Box::new(world.clone()));
        }
        if let Some(after) = filter.created_after {
            conditions.push("created_at >= ?".to_string());
            params.push(Box::new(after.to_rfc3339()));
        }
        if let Some(before) = filter.created_before {
            conditions.push("created_at <= ?".to_string());
            params.push(Box::new(before.to_rfc3339()));
        }

        Self { conditions, params }
    }

    /// Append clauses to a SQL string that already has a WHERE section
    pub fn append_to(&self, sql: &mut String) {
        for condition in &self.conditions {
            sql.push_str(" AND ");
            sql.push_str(condition);
        }
    }

    pub fn param_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryKind;
    use chrono::Utc;

    #[test]
    fn test_empty_filter_adds_nothing() {
        let sql = FilterSql::build(&MemoryFilter::default());
        assert!(sql.conditions.is_empty());
        assert!(sql.params.is_empty());
    }

    #[test]
    fn test_all_clauses_are_conjunctive() {
        let filter = MemoryFilter {
            kind: Some(MemoryKind::Conversation),
            owner_user_id: Some("u1".to_string()),
            owner_world_id: Some("w1".to_string()),
            created_after: Some(Utc::now()),
            created_before: Some(Utc::now()),
        };

        let sql = FilterSql::build(&filter);
        assert_eq!(sql.conditions.len(), 5);
        assert_eq!(sql.params.len(), 5);

        let mut rendered = String::from("SELECT * FROM records WHERE 1=1");
        sql.append_to(&mut rendered);
        assert_eq!(rendered.matches(" AND ").count(), 5);
    }
}
