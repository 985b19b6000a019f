//! Pipeline board dataset: ordered columns of deals, plus the reordering
//! rules applied when a card or column is dropped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::envelope::Migration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub name: String,
    pub value: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub deals: Vec<Deal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn deal(id: &str, name: &str, value: &str, owner: &str) -> Deal {
    Deal {
        id: id.to_string(),
        name: name.to_string(),
        value: value.to_string(),
        owner: owner.to_string(),
        link: None,
        comments: None,
    }
}

fn column(id: &str, title: &str, deals: Vec<Deal>) -> Column {
    Column {
        id: id.to_string(),
        title: title.to_string(),
        deals,
        description: None,
    }
}

/// Board shown to a workspace that has never saved one
pub fn default_columns() -> Vec<Column> {
    vec![
        column(
            "leads",
            "Leads",
            vec![
                deal("orbit", "Orbit Media", "R$ 18k", "Ana C."),
                deal("silo", "Silo Retail", "R$ 22k", "Lucas M."),
            ],
        ),
        column(
            "qualified",
            "Qualificados",
            vec![
                deal("argo", "Argo Health", "R$ 92k", "Lucas M."),
                deal("nova", "Nova Terra", "R$ 36k", "Sofia L."),
            ],
        ),
        column(
            "proposal",
            "Proposta",
            vec![
                deal("prisma", "Prisma Bank", "R$ 68k", "Rafael P."),
                deal("bluebay", "Bluebay", "R$ 41k", "Joana S."),
            ],
        ),
        column(
            "closing",
            "Fechamento",
            vec![
                deal("caravel", "Studio Caravel", "R$ 48k", "Ana C."),
                deal("gema", "Gema Labs", "R$ 31k", "Diego M."),
            ],
        ),
    ]
}

/// Where a dragged card was released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget<'a> {
    /// On another card: take its position
    Deal(&'a str),
    /// On a column's empty area: append to it
    Column(&'a str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
}

impl Board {
    /// Read a board document; unreadable columns give an empty board
    pub fn from_payload(payload: &Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_default()
    }

    pub fn to_payload(&self) -> Value {
        json!({ "columns": self.columns })
    }

    pub fn column_of_deal(&self, deal_id: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.deals.iter().any(|deal| deal.id == deal_id))
    }

    fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.id == column_id)
    }

    /// Move the column `active_id` to the position of `over_id`, or to the
    /// position of the column holding the deal `over_id`. Returns whether
    /// the board changed.
    pub fn move_column(&mut self, active_id: &str, over_id: &str) -> bool {
        let Some(from) = self.column_index(active_id) else {
            return false;
        };
        let Some(to) = self
            .column_index(over_id)
            .or_else(|| self.column_of_deal(over_id))
        else {
            return false;
        };
        if from == to {
            return false;
        }
        let moving = self.columns.remove(from);
        self.columns.insert(to, moving);
        true
    }

    /// Move a deal to a drop target. Returns whether the board changed.
    pub fn move_deal(&mut self, deal_id: &str, target: DropTarget<'_>) -> bool {
        let Some(source) = self.column_of_deal(deal_id) else {
            return false;
        };
        let (destination, index) = match target {
            DropTarget::Deal(over_id) => {
                if over_id == deal_id {
                    return false;
                }
                let Some(destination) = self.column_of_deal(over_id) else {
                    return false;
                };
                let index = self.columns[destination]
                    .deals
                    .iter()
                    .position(|deal| deal.id == over_id)
                    .unwrap_or(0);
                (destination, index)
            }
            DropTarget::Column(column_id) => {
                let Some(destination) = self.column_index(column_id) else {
                    return false;
                };
                (destination, self.columns[destination].deals.len())
            }
        };

        let Some(old_index) = self.columns[source]
            .deals
            .iter()
            .position(|deal| deal.id == deal_id)
        else {
            return false;
        };

        if source == destination {
            let deals = &mut self.columns[source].deals;
            let index = index.min(deals.len() - 1);
            if old_index == index {
                return false;
            }
            let moving = deals.remove(old_index);
            deals.insert(index, moving);
            return true;
        }

        let moving = self.columns[source].deals.remove(old_index);
        let deals = &mut self.columns[destination].deals;
        let index = index.min(deals.len());
        deals.insert(index, moving);
        true
    }

    /// Append an empty stage named after its position
    pub fn add_column(&mut self, id: impl Into<String>) -> &Column {
        let title = format!("Etapa {}", self.columns.len() + 1);
        self.columns.push(Column {
            id: id.into(),
            title,
            deals: Vec::new(),
            description: None,
        });
        &self.columns[self.columns.len() - 1]
    }

    pub fn add_deal(&mut self, column_id: &str, deal: Deal) -> bool {
        match self.column_index(column_id) {
            Some(index) => {
                self.columns[index].deals.push(deal);
                true
            }
            None => false,
        }
    }

    pub fn deal_count(&self) -> usize {
        self.columns.iter().map(|column| column.deals.len()).sum()
    }
}

/// Board documents were once stored as a bare column array. Version 1 is
/// always `{columns}` and never empty.
pub struct BoardMigration;

impl BoardMigration {
    pub const VERSION: u32 = 1;
}

impl Migration for BoardMigration {
    fn current_version(&self) -> u32 {
        Self::VERSION
    }

    fn migrate(&self, _from_version: u32, payload: Value) -> Value {
        let columns = match payload {
            Value::Array(columns) => columns,
            Value::Object(mut map) => match map.remove("columns") {
                Some(Value::Array(columns)) => columns,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        if columns.is_empty() {
            return json!({ "columns": default_columns() });
        }
        json!({ "columns": columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        Board {
            columns: default_columns(),
        }
    }

    fn ids(column: &Column) -> Vec<&str> {
        column.deals.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_move_deal_within_column() {
        let mut board = board();
        assert!(board.move_deal("orbit", DropTarget::Deal("silo")));
        assert_eq!(ids(&board.columns[0]), vec!["silo", "orbit"]);

        // Dropping on its own column appends, which is already the case
        assert!(!board.move_deal("orbit", DropTarget::Column("leads")));
        assert!(!board.move_deal("orbit", DropTarget::Deal("orbit")));
    }

    #[test]
    fn test_move_deal_across_columns() {
        let mut board = board();

        assert!(board.move_deal("orbit", DropTarget::Deal("nova")));
        assert_eq!(ids(&board.columns[0]), vec!["silo"]);
        assert_eq!(ids(&board.columns[1]), vec!["argo", "orbit", "nova"]);

        assert!(board.move_deal("silo", DropTarget::Column("closing")));
        assert!(board.columns[0].deals.is_empty());
        assert_eq!(ids(&board.columns[3]), vec!["caravel", "gema", "silo"]);

        assert!(board.move_deal("argo", DropTarget::Column("leads")));
        assert_eq!(ids(&board.columns[0]), vec!["argo"]);
        assert_eq!(board.deal_count(), 8);
    }

    #[test]
    fn test_move_unknown_targets() {
        let mut board = board();
        assert!(!board.move_deal("ghost", DropTarget::Column("leads")));
        assert!(!board.move_deal("orbit", DropTarget::Column("ghost")));
        assert!(!board.move_deal("orbit", DropTarget::Deal("ghost")));
        assert_eq!(board, self::board());
    }

    #[test]
    fn test_move_column() {
        let mut board = board();
        assert!(board.move_column("closing", "leads"));
        let order: Vec<&str> = board.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["closing", "leads", "qualified", "proposal"]);

        // Dropping on a card counts as its column
        assert!(board.move_column("closing", "bluebay"));
        let order: Vec<&str> = board.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["leads", "qualified", "proposal", "closing"]);

        assert!(!board.move_column("leads", "leads"));
    }

    #[test]
    fn test_add_column_and_deal() {
        let mut board = Board::default();
        assert_eq!(board.add_column("stage-a1").title, "Etapa 1");
        assert!(board.add_deal("stage-a1", deal("d1", "Deal", "R$ 1k", "Ana C.")));
        assert!(!board.add_deal("missing", deal("d2", "Deal", "R$ 1k", "Ana C.")));
        assert_eq!(board.deal_count(), 1);
    }

    #[test]
    fn test_board_migration_shapes() {
        let columns = json!([{ "id": "a", "title": "A", "deals": [] }]);

        let from_array = BoardMigration.migrate(0, columns.clone());
        assert_eq!(from_array, json!({ "columns": columns }));

        let from_object = BoardMigration.migrate(0, json!({ "columns": columns }));
        assert_eq!(from_object, from_array);

        let empty = BoardMigration.migrate(0, json!({ "columns": [] }));
        let board = Board::from_payload(&empty);
        assert_eq!(board.columns, default_columns());

        let missing = BoardMigration.migrate(0, Value::Null);
        assert_eq!(Board::from_payload(&missing).columns.len(), 4);
    }

    #[test]
    fn test_payload_round_trip_keeps_optional_fields() {
        let payload = json!({ "columns": [{
            "id": "a",
            "title": "A",
            "description": "first",
            "deals": [{ "id": "d", "name": "D", "value": "1", "owner": "o", "link": "https://x" }]
        }]});
        let board = Board::from_payload(&payload);
        assert_eq!(board.to_payload(), payload);
    }
}
