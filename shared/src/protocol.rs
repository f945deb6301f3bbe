/// API path prefix
pub const API_PREFIX: &str = "/api/v1";

/// Highest ONU id a single PON port can hold
pub const MAX_ONU_PER_PON: u32 = 128;

/// Boards (chassis positions) recognized by this deployment
pub const BOARDS: [u8; 2] = [1, 2];

/// PON ports per board
pub const PONS_PER_BOARD: u8 = 8;

/// TTL applied at every cache call site
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default and upper bound for the `limit` query parameter
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Query parameter names used by the paged listing
pub const PAGE_VAR: &str = "page";
pub const PAGE_SIZE_VAR: &str = "limit";

/// Returns true when `board` is a chassis position this deployment knows
pub fn is_valid_board(board: u8) -> bool {
    BOARDS.contains(&board)
}

/// Returns true when `pon` is a port number within a board
pub fn is_valid_pon(pon: u8) -> bool {
    (1..=PONS_PER_BOARD).contains(&pon)
}

/// Returns true when `onu_id` is an attachable slot on a PON port
pub fn is_valid_onu_id(onu_id: u32) -> bool {
    (1..=MAX_ONU_PER_PON).contains(&onu_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_domains() {
        assert!(is_valid_board(1));
        assert!(is_valid_board(2));
        assert!(!is_valid_board(0));
        assert!(!is_valid_board(3));

        assert!(is_valid_pon(1));
        assert!(is_valid_pon(8));
        assert!(!is_valid_pon(0));
        assert!(!is_valid_pon(9));

        assert!(is_valid_onu_id(1));
        assert!(is_valid_onu_id(128));
        assert!(!is_valid_onu_id(0));
        assert!(!is_valid_onu_id(129));
    }
}
