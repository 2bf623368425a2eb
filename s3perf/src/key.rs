//! Naming of benchmark objects.

/// Returns the key of object `index` written by `worker`.
///
/// Keys have the form `<prefix><worker>_<index>`. Uploads, downloads and cleanup all derive their
/// keys through this function, which is what lets a download stage find the objects of an earlier
/// upload stage.
pub fn object_key(prefix: &str, worker: usize, index: usize) -> String {
    format!("{prefix}{worker}_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_worker_and_index() {
        assert_eq!(object_key("obj/", 0, 0), "obj/0_0");
        assert_eq!(object_key("obj/", 12, 345), "obj/12_345");
        assert_eq!(object_key("", 1, 2), "1_2");
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(object_key("bench-", 3, 7), object_key("bench-", 3, 7));
    }

    #[test]
    fn workers_do_not_collide() {
        // Without the separator, worker 1 index 12 and worker 11 index 2 would clash.
        assert_ne!(object_key("p", 1, 12), object_key("p", 11, 2));
    }
}
