use super::*;
use crate::runtime::error::ErrorKind;

#[test]
fn call_then_uncall_restores_state() {
    let registry = load(
        "func step()(x)\n\
         x += 40\n\
         x *= 2\n\
         return (x)\n",
    );
    let forward = call(&registry, "step", Direction::Forward, &[("x", num(1))]).unwrap();
    assert_eq!(forward, vec![num(82)]);
    let back = call(&registry, "step", Direction::Reverse, &[("x", num(82))]).unwrap();
    assert_eq!(back, vec![num(1)]);
}

#[test]
fn uncall_checks_intermediate_lets() {
    let registry = load(
        "func build()(out)\n\
         let t = 5\n\
         out += t\n\
         unlet t = 5\n\
         return (out)\n",
    );
    let forward = call(&registry, "build", Direction::Forward, &[("out", num(2))]).unwrap();
    assert_eq!(forward, vec![num(7)]);
    let back = call(&registry, "build", Direction::Reverse, &[("out", num(7))]).unwrap();
    assert_eq!(back, vec![num(2)]);
}

#[test]
fn unlet_value_mismatch_fails() {
    let err = run_main(
        "func main(argv)()\n\
         let x = 3\n\
         x += 1\n\
         unlet x = 3\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn stack_push_pop_symmetry() {
    run_main(
        "func main(argv)()\n\
         let s = [1, 2]\n\
         let x = 9\n\
         push x => s\n\
         pop y <= s\n\
         unlet y = 9\n\
         unlet s = [1, 2]\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn push_consumes_the_source_variable() {
    let err = run_main(
        "func main(argv)()\n\
         let s = []\n\
         let x = 1\n\
         push x => s\n\
         x += 1\n\
         unlet s = [1]\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Scope(_)));
}

#[test]
fn swap_is_an_involution() {
    run_main(
        "func main(argv)()\n\
         let a = 1\n\
         let b = [5, 6]\n\
         swap a <=> b\n\
         swap a <=> b\n\
         unlet a = 1\n\
         unlet b = [5, 6]\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn modops_cancel_against_their_inverses() {
    run_main(
        "func main(argv)()\n\
         let x = 7\n\
         x += 5\n\
         x -= 5\n\
         x *= 3\n\
         x /= 3\n\
         x ^= 9\n\
         x ^= 9\n\
         unlet x = 7\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn floor_div_modop_cannot_be_uncalled() {
    let registry = load(
        "func lossy()(x)\n\
         x //= 2\n\
         return (x)\n",
    );
    call(&registry, "lossy", Direction::Forward, &[("x", num(7))]).unwrap();
    let err = call(&registry, "lossy", Direction::Reverse, &[("x", num(3))]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn self_modification_is_rejected() {
    let err = run_main(
        "func main(argv)()\n\
         let a = [1, 2]\n\
         let i = 0\n\
         a[i] += a[i]\n\
         unlet i = 0\n\
         unlet a = [2, 2]\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn mono_targets_may_read_themselves() {
    run_main(
        "func main(argv)()\n\
         let .scratch = 99\n\
         .scratch += .scratch\n\
         promote .scratch => kept\n\
         unlet kept = 198\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn fi_assertion_must_match_the_guard() {
    let err = run_main(
        "func main(argv)()\n\
         let x = 1\n\
         if (x == 1)\n\
         x += 1\n\
         fi (x == 1)\n\
         unlet x = 2\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn if_selects_the_branch_by_post_predicate_in_reverse() {
    let registry = load(
        "func choose()(x)\n\
         if (x < 10)\n\
         x += 10\n\
         else\n\
         x -= 1\n\
         fi (x >= 10)\n\
         return (x)\n",
    );
    // 3 takes the then branch; reversing from 13 must take it again
    let forward = call(&registry, "choose", Direction::Forward, &[("x", num(3))]).unwrap();
    assert_eq!(forward, vec![num(13)]);
    let back = call(&registry, "choose", Direction::Reverse, &[("x", num(13))]).unwrap();
    assert_eq!(back, vec![num(3)]);
}

#[test]
fn loop_requires_a_true_entry_predicate() {
    let err = run_main(
        "func main(argv)()\n\
         let i = 0\n\
         loop (i > 0)\n\
         i -= 1\n\
         pool ((i > 0) & (i < 0))\n\
         unlet i = 0\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn loop_rejects_a_true_exit_predicate_at_entry() {
    let err = run_main(
        "func main(argv)()\n\
         let i = 3\n\
         loop (i > 0)\n\
         i -= 1\n\
         pool (i <= 3)\n\
         unlet i = 0\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn countdown_loop_runs_and_reverses() {
    let registry = load(
        "func drain()(i, total)\n\
         loop (i > 0)\n\
         total += i\n\
         i -= 1\n\
         pool ((i > 0) & (total > 0))\n\
         return (i, total)\n",
    );
    let forward = call(
        &registry,
        "drain",
        Direction::Forward,
        &[("i", num(4)), ("total", num(0))],
    )
    .unwrap();
    assert_eq!(forward, vec![num(0), num(10)]);
    let back = call(
        &registry,
        "drain",
        Direction::Reverse,
        &[("i", num(0)), ("total", num(10))],
    )
    .unwrap();
    assert_eq!(back, vec![num(4), num(0)]);
}

#[test]
fn for_reverses_the_iteration_order() {
    let registry = load(
        "func digits()(out)\n\
         for (v in [1 to 4])\n\
         out *= 10\n\
         out += v\n\
         rof\n\
         return (out)\n",
    );
    let forward = call(&registry, "digits", Direction::Forward, &[("out", num(0))]).unwrap();
    assert_eq!(forward, vec![num(123)]);
    let back = call(&registry, "digits", Direction::Reverse, &[("out", num(123))]).unwrap();
    assert_eq!(back, vec![num(0)]);
}

#[test]
fn for_loop_variable_must_be_unchanged() {
    let err = run_main(
        "func main(argv)()\n\
         for (v in [0 to 3])\n\
         v += 1\n\
         rof\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Reversibility(_)));
}

#[test]
fn try_binds_the_first_catching_value() {
    run_main(
        "func main(argv)()\n\
         try (v in [0 to 10])\n\
         catch (v == 4)\n\
         yrt\n\
         unlet v = 4\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn try_rolls_back_failed_attempts() {
    run_main(
        "func main(argv)()\n\
         let marks = []\n\
         try (v in [0 to 5])\n\
         let probe = v * v\n\
         catch (probe == 9)\n\
         yrt\n\
         unlet probe = 9\n\
         unlet v = 3\n\
         unlet marks = []\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn try_exhaustion_is_an_error() {
    let err = run_main(
        "func main(argv)()\n\
         try (v in [0 to 3])\n\
         catch (v == 9)\n\
         yrt\n\
         unlet v = 9\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TryExhausted(_)));
}

#[test]
fn do_yield_undo_uncomputes_the_preamble() {
    run_main(
        "func main(argv)()\n\
         let x = 2\n\
         let seen = 0\n\
         do\n\
         let t = x * 10\n\
         yield\n\
         seen += t\n\
         undo\n\
         unlet seen = 20\n\
         unlet x = 2\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn leaked_locals_are_reported_at_function_exit() {
    let err = run_main(
        "func main(argv)()\n\
         let leak = 1\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Scope(_)));
}

#[test]
fn globals_are_readable_but_immutable() {
    let registry = load(
        "global scale = 4\n\
         func apply()(x)\n\
         x *= scale\n\
         return (x)\n",
    );
    let result = call(&registry, "apply", Direction::Forward, &[("x", num(3))]).unwrap();
    assert_eq!(result, vec![num(12)]);

    let err = run_main(
        "global scale = 4\n\
         func main(argv)()\n\
         scale += 1\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Scope(_)));
}
