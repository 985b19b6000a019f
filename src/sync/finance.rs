//! Finance dataset: expense categories and expenses.
//!
//! Version 2 replaced the personal-budget category set with a business one.
//! Older documents that still use the old set are reset to the current
//! defaults and their expenses are moved to the closest new category.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::envelope::Migration;

/// Colors a category may carry; anything else is replaced by position
pub const CATEGORY_COLORS: [&str; 10] = [
    "blue", "green", "orange", "purple", "pink", "teal", "amber", "red", "indigo", "slate",
];

const DEFAULT_CATEGORIES: [(&str, &str); 12] = [
    ("fin-cat-pessoal", "Pessoal"),
    ("fin-cat-operacional", "Operacional"),
    ("fin-cat-fornecedores", "Fornecedores"),
    ("fin-cat-servicos", "Serviços"),
    ("fin-cat-marketing", "Marketing"),
    ("fin-cat-folha", "Folha"),
    ("fin-cat-impostos", "Impostos"),
    ("fin-cat-tecnologia", "Tecnologia"),
    ("fin-cat-infra", "Infraestrutura"),
    ("fin-cat-viagens", "Viagens"),
    ("fin-cat-treinamento", "Treinamento"),
    ("fin-cat-outros", "Outros"),
];

/// Old category id to its replacement
const LEGACY_CATEGORY_MAP: [(&str, &str); 12] = [
    ("cat-moradia", "fin-cat-infra"),
    ("cat-alimentacao", "fin-cat-operacional"),
    ("cat-transporte", "fin-cat-viagens"),
    ("cat-saude", "fin-cat-servicos"),
    ("cat-lazer", "fin-cat-pessoal"),
    ("cat-educacao", "fin-cat-treinamento"),
    ("cat-assinaturas", "fin-cat-tecnologia"),
    ("cat-impostos", "fin-cat-impostos"),
    ("cat-investimentos", "fin-cat-outros"),
    ("cat-viagem", "fin-cat-viagens"),
    ("cat-compras", "fin-cat-fornecedores"),
    ("cat-outros", "fin-cat-outros"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
}

pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .enumerate()
        .map(|(index, (id, name))| Category {
            id: id.to_string(),
            name: name.to_string(),
            color: CATEGORY_COLORS[index % CATEGORY_COLORS.len()].to_string(),
        })
        .collect()
}

/// Clean one stored category. Nameless entries are dropped, a missing id is
/// generated and an unknown color is replaced by the palette entry for its
/// position.
fn normalize_category(value: &Value, index: usize) -> Option<Category> {
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("cat-{}-{}", chrono::Utc::now().timestamp_millis(), index));

    let color = value
        .get("color")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|color| CATEGORY_COLORS.contains(color))
        .unwrap_or(CATEGORY_COLORS[index % CATEGORY_COLORS.len()])
        .to_string();

    Some(Category {
        id,
        name: name.to_string(),
        color,
    })
}

pub fn sanitize_categories(value: Option<&Value>) -> Vec<Category> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| normalize_category(item, index))
            .collect(),
        _ => Vec::new(),
    }
}

/// True when the categories predate the current default set
pub fn is_legacy_category_set(categories: &[Category]) -> bool {
    if categories.is_empty() {
        return true;
    }
    let legacy_id = categories
        .iter()
        .any(|cat| LEGACY_CATEGORY_MAP.iter().any(|(old, _)| *old == cat.id));
    if legacy_id {
        return true;
    }
    !categories
        .iter()
        .any(|cat| DEFAULT_CATEGORIES.iter().any(|(_, name)| *name == cat.name))
}

/// Point expenses filed under an old category at its replacement
pub fn remap_legacy_expenses(expenses: Vec<Value>) -> Vec<Value> {
    expenses
        .into_iter()
        .map(|mut expense| {
            let replacement = expense
                .get("categoryId")
                .and_then(Value::as_str)
                .and_then(|id| LEGACY_CATEGORY_MAP.iter().find(|(old, _)| *old == id))
                .map(|(_, new)| *new);
            if let (Some(new), Some(map)) = (replacement, expense.as_object_mut()) {
                map.insert("categoryId".to_string(), json!(new));
            }
            expense
        })
        .collect()
}

pub struct FinanceMigration;

impl FinanceMigration {
    pub const VERSION: u32 = 2;

    fn reset_legacy_categories(payload: Value) -> Value {
        let mut document = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let categories = sanitize_categories(document.get("categories"));
        let expenses = match document.remove("expenses") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        let (categories, expenses) = if is_legacy_category_set(&categories) {
            (default_categories(), remap_legacy_expenses(expenses))
        } else {
            (categories, expenses)
        };

        document.insert("categories".to_string(), json!(categories));
        document.insert("expenses".to_string(), Value::Array(expenses));
        Value::Object(document)
    }
}

impl Migration for FinanceMigration {
    fn current_version(&self) -> u32 {
        Self::VERSION
    }

    fn migrate(&self, from_version: u32, payload: Value) -> Value {
        if from_version < 2 {
            Self::reset_legacy_categories(payload)
        } else {
            payload
        }
    }
}
