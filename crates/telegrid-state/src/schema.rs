//! Cluster schema view derived from per-agent table announcements.
//!
//! The computed schema is the union over live agents' schemas: one
//! canonical descriptor per table name plus the set of agents that own the
//! table. It is maintained incrementally; a table disappears the moment its
//! last owner does.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::types::TableInfo;

/// Materialized cluster-wide schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComputedSchema {
    /// Canonical descriptor per table name.
    pub tables: BTreeMap<String, TableInfo>,
    /// Agents announcing each table.
    pub owners: BTreeMap<String, BTreeSet<Uuid>>,
}

impl ComputedSchema {
    /// Add `agent` as an owner of `info`'s table, installing or validating
    /// the canonical descriptor. Returns whether the cluster view changed.
    pub fn add_owner(&mut self, agent: Uuid, info: &TableInfo) -> bool {
        let mut changed = self
            .owners
            .entry(info.name.clone())
            .or_default()
            .insert(agent);

        match self.tables.get(&info.name) {
            None => {
                self.tables.insert(info.name.clone(), info.clone());
                changed = true;
            }
            Some(canonical) if canonical != info => {
                let other_owners = self.owners[&info.name].len() > 1;
                if other_owners {
                    warn!(
                        table = %info.name,
                        %agent,
                        "table descriptor differs from canonical, replacing"
                    );
                }
                self.tables.insert(info.name.clone(), info.clone());
                changed = true;
            }
            Some(_) => {}
        }
        changed
    }

    /// Drop `agent` from `table`'s owner set, removing the table when the
    /// set empties. Returns whether the cluster view changed.
    pub fn remove_owner(&mut self, table: &str, agent: Uuid) -> bool {
        let Some(set) = self.owners.get_mut(table) else {
            return false;
        };
        let changed = set.remove(&agent);
        if set.is_empty() {
            self.owners.remove(table);
            self.tables.remove(table);
        }
        changed
    }

    /// Drop `agent` from every owner set. Returns whether the cluster view
    /// changed.
    pub fn remove_agent(&mut self, agent: Uuid) -> bool {
        let tables: Vec<String> = self.owners.keys().cloned().collect();
        let mut changed = false;
        for table in tables {
            changed |= self.remove_owner(&table, agent);
        }
        changed
    }

    /// Agents owning `table`, if any.
    pub fn owners_of(&self, table: &str) -> Option<&BTreeSet<Uuid>> {
        self.owners.get(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnInfo, ColumnType};

    fn table(name: &str) -> TableInfo {
        TableInfo {
            name: name.to_string(),
            columns: vec![ColumnInfo {
                name: "time_".to_string(),
                column_type: ColumnType::Time,
            }],
            tabletization_key: None,
        }
    }

    fn agent(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn add_owner_installs_table() {
        let mut schema = ComputedSchema::default();
        assert!(schema.add_owner(agent(1), &table("conn_stats")));

        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.owners_of("conn_stats").unwrap().len(), 1);
    }

    #[test]
    fn second_owner_changes_owner_set_only() {
        let mut schema = ComputedSchema::default();
        schema.add_owner(agent(1), &table("conn_stats"));
        assert!(schema.add_owner(agent(2), &table("conn_stats")));
        // Re-adding the same owner with the same descriptor is a no-op.
        assert!(!schema.add_owner(agent(2), &table("conn_stats")));

        assert_eq!(schema.tables.len(), 1);
        assert_eq!(schema.owners_of("conn_stats").unwrap().len(), 2);
    }

    #[test]
    fn descriptor_mismatch_replaces_canonical() {
        let mut schema = ComputedSchema::default();
        schema.add_owner(agent(1), &table("conn_stats"));

        let mut wider = table("conn_stats");
        wider.columns.push(ColumnInfo {
            name: "bytes".to_string(),
            column_type: ColumnType::Int64,
        });
        assert!(schema.add_owner(agent(2), &wider));
        assert_eq!(schema.tables["conn_stats"], wider);
    }

    #[test]
    fn last_owner_removal_drops_table() {
        let mut schema = ComputedSchema::default();
        schema.add_owner(agent(1), &table("conn_stats"));
        schema.add_owner(agent(2), &table("conn_stats"));

        assert!(schema.remove_owner("conn_stats", agent(1)));
        assert_eq!(schema.tables.len(), 1);

        assert!(schema.remove_owner("conn_stats", agent(2)));
        assert!(schema.tables.is_empty());
        assert!(schema.owners.is_empty());
    }

    #[test]
    fn remove_unknown_owner_is_noop() {
        let mut schema = ComputedSchema::default();
        schema.add_owner(agent(1), &table("conn_stats"));
        assert!(!schema.remove_owner("conn_stats", agent(9)));
        assert!(!schema.remove_owner("no_such_table", agent(1)));
    }

    #[test]
    fn remove_agent_sweeps_all_tables() {
        let mut schema = ComputedSchema::default();
        schema.add_owner(agent(1), &table("conn_stats"));
        schema.add_owner(agent(1), &table("http_events"));
        schema.add_owner(agent(2), &table("http_events"));

        assert!(schema.remove_agent(agent(1)));
        assert!(schema.tables.contains_key("http_events"));
        assert!(!schema.tables.contains_key("conn_stats"));
    }
}
