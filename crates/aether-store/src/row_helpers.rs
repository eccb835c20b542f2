use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Deserialize a JSON string column, returning CorruptRow on parse failure.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::RunConfig;

    #[test]
    fn parse_enum_success() {
        let result: Result<crate::runs::RunStatus, _> =
            parse_enum("running", "runs", "status");
        assert!(result.is_ok());
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<crate::runs::RunStatus, _> =
            parse_enum("INVALID", "runs", "status");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "runs", column: "status", .. })
        ));
    }

    #[test]
    fn parse_json_success() {
        let json = serde_json::to_string(&RunConfig::default()).unwrap();
        let parsed: RunConfig = parse_json(&json, "runs", "config").unwrap();
        assert_eq!(parsed, RunConfig::default());
    }

    #[test]
    fn parse_json_failure() {
        let result: Result<RunConfig, _> = parse_json("not valid json", "runs", "config");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "runs", column: "config", .. })
        ));
    }
}
