use super::*;

#[test]
fn add_installs_a_fresh_uncancelled_token() {
    let mgr = CancelManager::new();
    let token = mgr.add("s1", 1);
    assert!(!token.is_cancelled());
    assert!(mgr.contains("s1"));
}

#[test]
fn add_cancels_the_previous_token_for_the_same_id() {
    let mgr = CancelManager::new();
    let first = mgr.add("s1", 1);
    assert!(!first.is_cancelled());

    let second = mgr.add("s1", 2);
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
}

#[test]
fn add_does_not_cancel_tokens_for_other_ids() {
    let mgr = CancelManager::new();
    let s1 = mgr.add("s1", 1);
    let _s2 = mgr.add("s2", 1);
    assert!(!s1.is_cancelled());
}

#[test]
fn delete_with_matching_seq_cancels_and_removes() {
    let mgr = CancelManager::new();
    let token = mgr.add("s1", 5);
    mgr.delete("s1", 5);
    assert!(token.is_cancelled());
    assert!(!mgr.contains("s1"));
}

#[test]
fn delete_with_stale_seq_is_a_no_op() {
    let mgr = CancelManager::new();
    let first = mgr.add("s1", 1);
    let second = mgr.add("s1", 2);

    // A slow caller for the superseded req_seq=1 tries to clean up late.
    mgr.delete("s1", 1);

    assert!(first.is_cancelled(), "already cancelled by the second add");
    assert!(!second.is_cancelled(), "delete(1) must not touch seq=2's pair");
    assert!(mgr.contains("s1"), "seq=2's pair must still be installed");
}

#[test]
fn delete_on_unknown_id_is_a_no_op() {
    let mgr = CancelManager::new();
    mgr.delete("ghost", 0);
    assert!(!mgr.contains("ghost"));
}

#[test]
fn req_seq_is_monotonically_increasing() {
    let seq = ReqSeq::new();
    let a = seq.next();
    let b = seq.next();
    let c = seq.next();
    assert!(a < b);
    assert!(b < c);
}
