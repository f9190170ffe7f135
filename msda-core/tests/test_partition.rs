use msda_core::WorkPartition;
use proptest::prelude::*;

proptest! {
    #[test]
    fn ranges_cover_queries_exactly_once(total in 0usize..500, workers in 1usize..64) {
        let partition = WorkPartition::new(total, workers).unwrap();
        let mut owner = vec![0u32; total];
        for range in partition.ranges() {
            prop_assert!(range.len() <= partition.chunk_len());
            for q in range {
                owner[q] += 1;
            }
        }
        prop_assert!(owner.iter().all(|&n| n == 1));
    }

    #[test]
    fn ranges_are_contiguous_and_ordered(total in 0usize..500, workers in 1usize..64) {
        let partition = WorkPartition::new(total, workers).unwrap();
        let mut next = 0;
        for range in partition.ranges() {
            prop_assert_eq!(range.start, next);
            next = range.end;
        }
        prop_assert_eq!(next, total);
    }

    #[test]
    fn only_the_tail_is_short(total in 1usize..500, workers in 1usize..64) {
        let partition = WorkPartition::new(total, workers).unwrap();
        let active = partition.active_workers();
        prop_assert!(active >= 1 && active <= workers);
        for w in 0..active.saturating_sub(1) {
            prop_assert_eq!(partition.range(w).len(), partition.chunk_len());
        }
        for w in active..workers {
            prop_assert!(partition.range(w).is_empty());
        }
    }
}
