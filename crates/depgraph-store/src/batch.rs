//! Statement sizing against the Postgres parameter ceiling.

/// Hard limit on bind parameters per statement imposed by the wire protocol.
pub const MAX_QUERY_PARAMS: usize = 65_535;

/// How many rows a multi-row statement may carry at `params_per_row`
/// parameters each without breaching [`MAX_QUERY_PARAMS`].
pub fn max_rows(params_per_row: usize) -> usize {
    MAX_QUERY_PARAMS / params_per_row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_never_exceed_the_parameter_cap() {
        for params_per_row in [1, 3, 7, 8, 13] {
            let rows = vec![(); 200_000];
            for chunk in rows.chunks(max_rows(params_per_row)) {
                assert!(chunk.len() * params_per_row <= MAX_QUERY_PARAMS);
            }
        }
    }

    #[test]
    fn test_all_rows_are_covered() {
        let rows = vec![(); 150_001];
        let total: usize = rows.chunks(max_rows(13)).map(<[()]>::len).sum();
        assert_eq!(total, rows.len());
    }

    #[test]
    fn test_single_param_rows_fill_the_statement() {
        assert_eq!(max_rows(1), MAX_QUERY_PARAMS);
    }
}
