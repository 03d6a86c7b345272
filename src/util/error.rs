/// エラー分類ユーティリティ。
use sqlx::Error as SqlxError;

/// キューのバックエンドに到達できない種類のエラーかどうかを判定する。
///
/// 接続系の障害（プール枯渇・切断・I/Oエラー）だけが対象。SQL構文や
/// 制約違反など、再実行しても直らないものは対象外。
pub(crate) fn is_connection_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => true,
        SqlxError::Database(db) => {
            // Postgres class 08 = connection exception
            db.code().is_some_and(|code| code.starts_with("08"))
        }
        other => {
            let text = other.to_string().to_lowercase();
            text.contains("connection refused") || text.contains("connection reset")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_connection_errors() {
        assert!(is_connection_error(&SqlxError::PoolTimedOut));
        assert!(is_connection_error(&SqlxError::PoolClosed));
    }

    #[test]
    fn row_not_found_is_not_a_connection_error() {
        assert!(!is_connection_error(&SqlxError::RowNotFound));
    }

    #[test]
    fn io_errors_are_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(is_connection_error(&SqlxError::Io(io)));
    }
}
