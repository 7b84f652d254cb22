use crate::remote::RemoteError;

/// Extracts the online count from a `list` reply.
///
/// Handles both `There are 3 of a max of 20 players online: ...` and the
/// older `There are 3/20 players online:` layouts.
pub fn parse_player_count(output: &str) -> Result<u32, RemoteError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("There are"))
        .ok_or_else(|| RemoteError::UnexpectedResponse(output.trim().to_string()))?;

    let token = line
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| RemoteError::UnexpectedResponse(line.to_string()))?;
    let count = token.split('/').next().unwrap_or(token);
    count
        .parse::<u32>()
        .map_err(|_| RemoteError::UnexpectedResponse(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_list_reply() {
        let reply = "There are 2 of a max of 20 players online: alice, bob\n";
        assert_eq!(parse_player_count(reply).expect("count"), 2);
    }

    #[test]
    fn parses_empty_server() {
        let reply = "There are 0 of a max of 20 players online:";
        assert_eq!(parse_player_count(reply).expect("count"), 0);
    }

    #[test]
    fn parses_legacy_slash_layout() {
        let reply = "There are 5/10 players online:\nsteve, alex";
        assert_eq!(parse_player_count(reply).expect("count"), 5);
    }

    #[test]
    fn rejects_unrelated_output() {
        let err = parse_player_count("Unknown command").expect_err("not a list reply");
        assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
    }
}
