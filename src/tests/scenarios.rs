use super::*;
use crate::runtime::error::ErrorKind;
use num_bigint::BigInt;
use num_rational::BigRational;

const FIB: &str = "func fib()(n, previous, result)\n\
                   previous += 1\n\
                   let i = n\n\
                   loop (i > 0)\n\
                   swap result <=> previous\n\
                   result += previous\n\
                   i -= 1\n\
                   pool ((i > 0) & (i < n))\n\
                   unlet i = 0\n\
                   return (n, previous, result)\n";

#[test]
fn fibonacci_forward() {
    let registry = load(FIB);
    let result = call(
        &registry,
        "fib",
        Direction::Forward,
        &[("n", num(10)), ("previous", num(0)), ("result", num(0))],
    )
    .unwrap();
    assert_eq!(result, vec![num(10), num(34), num(55)]);
}

#[test]
fn fibonacci_reverse_recovers_the_inputs() {
    let registry = load(FIB);
    let result = call(
        &registry,
        "fib",
        Direction::Reverse,
        &[("n", num(10)), ("previous", num(34)), ("result", num(55))],
    )
    .unwrap();
    assert_eq!(result, vec![num(10), num(0), num(0)]);
}

const RLE: &str = "func compress()(src, dst)\n\
                   $ flip so the head of the input sits at the popping end $\n\
                   let n = #src\n\
                   let i = 0\n\
                   loop (i < n // 2)\n\
                   swap src[i] <=> src[n - 1 - i]\n\
                   i += 1\n\
                   pool ((i > 0) & (i < n // 2))\n\
                   unlet i = n // 2\n\
                   unlet n = #src\n\
                   loop (#src > 0)\n\
                   pop value <= src\n\
                   let count = 1\n\
                   if ((#src > 0) & (src[-1] == value))\n\
                   loop ((#src > 0) & (src[-1] == value))\n\
                   pop repeat <= src\n\
                   unlet repeat = value\n\
                   count += 1\n\
                   pool ((count > 1) & ((#src > 0) & (src[-1] == value)))\n\
                   else\n\
                   fi (count > 1)\n\
                   push count => dst\n\
                   push value => dst\n\
                   pool ((#src > 0) & (#dst > 0))\n\
                   return (src, dst)\n";

#[test]
fn run_length_encoding_compresses() {
    let registry = load(RLE);
    let input = arr(&[0, 0, 0, 3, 3, 3, 3, 3, 3, 3, 5, 5, 5, 0, 0, 0]);
    let result = call(
        &registry,
        "compress",
        Direction::Forward,
        &[("src", input), ("dst", arr(&[]))],
    )
    .unwrap();
    assert_eq!(result[0], arr(&[]));
    assert_eq!(result[1], arr(&[3, 0, 7, 3, 3, 5, 3, 0]));
}

#[test]
fn uncalling_compress_decompresses() {
    let registry = load(RLE);
    let result = call(
        &registry,
        "compress",
        Direction::Reverse,
        &[("src", arr(&[])), ("dst", arr(&[3, 0, 7, 3, 3, 5, 3, 0]))],
    )
    .unwrap();
    assert_eq!(result[0], arr(&[0, 0, 0, 3, 3, 3, 3, 3, 3, 3, 5, 5, 5, 0, 0, 0]));
    assert_eq!(result[1], arr(&[]));
}

const ARGMAX: &str = "func argmax(row)(best)\n\
                      try (i in [0 to #row])\n\
                      let .j = 0\n\
                      let .ok = 1\n\
                      loop (.j < #row)\n\
                      if (row[.j] > row[i])\n\
                      .ok &= 0\n\
                      fi\n\
                      .j += 1\n\
                      pool\n\
                      catch (.ok)\n\
                      yrt\n\
                      swap best <=> i\n\
                      unlet i = 0\n\
                      return (best)\n";

#[test]
fn argmax_finds_the_maximum_index() {
    let registry = load(ARGMAX);
    let row = arr(&[2, 7, 1, 9, 4, 9, 0, 3, 8, 5]);
    let result = call(
        &registry,
        "argmax",
        Direction::Forward,
        &[("row", row), ("best", num(0))],
    )
    .unwrap();
    // Ties resolve to the first maximal element
    assert_eq!(result[1], num(3));
}

#[test]
fn argmax_of_a_sorted_row_is_the_tail() {
    let registry = load(ARGMAX);
    let row = arr(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    let result = call(
        &registry,
        "argmax",
        Direction::Forward,
        &[("row", row), ("best", num(0))],
    )
    .unwrap();
    assert_eq!(result[1], num(9));
}

const STATS: &str = "func sums(data, acc)()\n\
                     let size = #data // #TID()\n\
                     let lo = TID() * size\n\
                     let i = lo\n\
                     loop (i < lo + size)\n\
                     acc[TID()] += data[i]\n\
                     i += 1\n\
                     pool ((i > lo) & (i < lo + size))\n\
                     unlet i = lo + size\n\
                     unlet lo = TID() * size\n\
                     unlet size = #data // #TID()\n\
                     return ()\n\
                     \n\
                     func sqsums(data, moments, acc)()\n\
                     let size = #data // #TID()\n\
                     let lo = TID() * size\n\
                     let i = lo\n\
                     loop (i < lo + size)\n\
                     acc[TID()] += (data[i] - moments[0]) ** 2\n\
                     i += 1\n\
                     pool ((i > lo) & (i < lo + size))\n\
                     unlet i = lo + size\n\
                     unlet lo = TID() * size\n\
                     unlet size = #data // #TID()\n\
                     return ()\n\
                     \n\
                     func stats(data)(out)\n\
                     let acc = [0 tensor [4]]\n\
                     call sums{4}(data, acc)\n\
                     out[0] += (acc[0] + acc[1] + acc[2] + acc[3]) / #data\n\
                     uncall sums{4}(data, acc)\n\
                     call sqsums{4}(data, out, acc)\n\
                     out[1] += (acc[0] + acc[1] + acc[2] + acc[3]) / #data\n\
                     uncall sqsums{4}(data, out, acc)\n\
                     unlet acc = [0 tensor [4]]\n\
                     return (out)\n";

#[test]
fn parallel_mean_and_variance_are_exact() {
    let registry = load(STATS);
    let data = Value::Array((0..100).map(Value::from_i64).collect());
    let result = call(
        &registry,
        "stats",
        Direction::Forward,
        &[("data", data), ("out", arr(&[0, 0]))],
    )
    .unwrap();
    let mean = Value::Number(BigRational::new(BigInt::from(99), BigInt::from(2)));
    let variance = Value::Number(BigRational::new(BigInt::from(3333), BigInt::from(4)));
    assert_eq!(result[1], Value::Array(vec![mean, variance]));
}

const EVOLVE: &str = "func step(grid, key)()\n\
                      let n = #grid\n\
                      let i = 0\n\
                      loop (i < n)\n\
                      if (i % 2 == 0)\n\
                      grid[i] += key[i % #key]\n\
                      else\n\
                      grid[i] ^= key[i % #key]\n\
                      fi (i % 2 == 0)\n\
                      i += 1\n\
                      pool ((i > 0) & (i < n))\n\
                      unlet i = n\n\
                      unlet n = #grid\n\
                      return ()\n\
                      \n\
                      func evolve(grid, key)()\n\
                      for (t in [0 to 20])\n\
                      call step(grid, key)\n\
                      rof\n\
                      return ()\n";

#[test]
fn twenty_updates_then_twenty_reversed_restore_the_grid() {
    let registry = load(EVOLVE);
    let grid = arr(&[1, 2, 3, 4, 5, 6, 7, 8]);
    let key = arr(&[3, 5]);

    let evolved = call(
        &registry,
        "evolve",
        Direction::Forward,
        &[("grid", grid.clone()), ("key", key.clone())],
    )
    .unwrap();
    assert_ne!(evolved[0], grid);
    assert_eq!(evolved[1], key);

    let restored = call(
        &registry,
        "evolve",
        Direction::Reverse,
        &[("grid", evolved[0].clone()), ("key", key.clone())],
    )
    .unwrap();
    assert_eq!(restored[0], grid);
}

#[test]
fn mutex_serializes_read_modify_write() {
    run_main(
        "func bump(counter)()\n\
         mutex \"lock\"\n\
         counter += 1\n\
         xetum\n\
         return ()\n\
         \n\
         func main(argv)()\n\
         let counter = 0\n\
         call bump{4}(counter)\n\
         unlet counter = 4\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn barrier_orders_the_two_phases() {
    run_main(
        "func stage(input, output)()\n\
         input[TID()] += TID() + 1\n\
         barrier \"filled\"\n\
         output[TID()] += input[(TID() + 1) % #TID()]\n\
         return ()\n\
         \n\
         func main(argv)()\n\
         let input = [0 tensor [4]]\n\
         let output = [0 tensor [4]]\n\
         call stage{4}(input, output)\n\
         unlet output = [2, 3, 4, 1]\n\
         unlet input = [1, 2, 3, 4]\n\
         return ()\n",
    )
    .unwrap();
}

#[test]
fn failing_thread_releases_barrier_waiters() {
    let err = run_main(
        "func risky(scratch)()\n\
         if (TID() == 0)\n\
         let boom = 1 / TID()\n\
         unlet boom = 0\n\
         else\n\
         barrier \"stuck\"\n\
         fi (TID() == 0)\n\
         return ()\n\
         \n\
         func main(argv)()\n\
         let scratch = 0\n\
         call risky{4}(scratch)\n\
         unlet scratch = 0\n\
         return ()\n",
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Arithmetic(_)));
}

#[test]
fn default_pool_size_comes_from_the_runtime() {
    let registry = load(
        "func tally(acc)()\n\
         mutex \"m\"\n\
         acc += #TID()\n\
         xetum\n\
         return ()\n\
         \n\
         func spread()(acc)\n\
         call tally{}(acc)\n\
         return (acc)\n",
    );
    let mut interp = Interpreter::new(Arc::clone(&registry), 3);
    let slot = crate::runtime::scope::Slot::owned(num(0), false);
    interp.frame_mut().bind("acc", slot.alias()).unwrap();
    interp.call("spread", Direction::Forward).unwrap();
    // three workers each add the pool size
    assert_eq!(slot.value(), num(9));
}
