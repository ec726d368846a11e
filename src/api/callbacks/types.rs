use serde::Deserialize;

pub const DEFAULT_DAYS: i64 = 3;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub days: Option<i64>,
}
