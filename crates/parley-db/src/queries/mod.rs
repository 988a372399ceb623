mod conversations;
mod messages;
mod reactions;
mod receipts;
mod typing;
mod users;

use anyhow::Result;

/// `?1, ?2, ... ?n` for IN-lists.
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn as_params(ids: &[String]) -> Vec<&dyn rusqlite::types::ToSql> {
    ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Database;
    use uuid::Uuid;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.ensure_user(&id, &format!("ext-{}", name), name, "", None, 0).unwrap();
        id
    }

    pub fn direct(db: &Database, a: &str, b: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let key = if a < b { format!("{}:{}", a, b) } else { format!("{}:{}", b, a) };
        assert!(db.insert_direct_conversation(&id, &key, &[a, b], 0).unwrap());
        id
    }
}
