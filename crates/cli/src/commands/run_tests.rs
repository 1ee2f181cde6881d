use super::share;

#[test]
fn share_splits_remainder_across_first_producers() {
    let shares: Vec<u64> = (0..4).map(|i| share(10, 4, i)).collect();
    assert_eq!(shares, vec![3, 3, 2, 2]);
    assert_eq!(shares.iter().sum::<u64>(), 10);
}

#[test]
fn share_with_more_producers_than_items() {
    let shares: Vec<u64> = (0..5).map(|i| share(2, 5, i)).collect();
    assert_eq!(shares, vec![1, 1, 0, 0, 0]);
}
