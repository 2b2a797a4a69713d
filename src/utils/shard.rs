/// Splits the target list into consecutive shards of at most `shard_size` URLs.
pub fn shard_targets(targets: &[String], shard_size: usize) -> Vec<Vec<String>> {
    targets
        .chunks(shard_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://site{i}.example")).collect()
    }

    #[test]
    fn test_shards_keep_order_and_bound_size() {
        let shards = shard_targets(&urls(12), 5);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].len(), 5);
        assert_eq!(shards[2], vec!["https://site10.example", "https://site11.example"]);
        assert_eq!(shards.concat(), urls(12));
    }

    #[test]
    fn test_empty_and_degenerate_sizes() {
        assert!(shard_targets(&[], 5).is_empty());
        assert_eq!(shard_targets(&urls(3), 0).len(), 3);
        assert_eq!(shard_targets(&urls(3), 10).len(), 1);
    }
}
