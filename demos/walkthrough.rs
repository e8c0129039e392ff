use std::{env, io::Read};

use brkalloc::{BrkAllocator, Config, Sbrk};
use libc::sbrk;

/// Waits until the user presses ENTER, when `BRKALLOC_PAUSE` is set.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  if env::var_os("BRKALLOC_PAUSE").is_none() {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn dump(allocator: &BrkAllocator<Sbrk>) {
  if let Err(err) = allocator.dump_stderr() {
    eprintln!("dump failed: {err}");
  }
}

fn main() {
  env_logger::init();

  // SAFETY: `brkalloc::GLOBAL` is never touched in this program, so this is
  // the only user of the break besides the system allocator, which copes
  // with foreign `sbrk` calls.
  let config = Config::VERBOSE.with_label("demo");
  let allocator = BrkAllocator::with_config(unsafe { Sbrk::new() }, config);

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 64 bytes, then 32 bytes. The heap grows twice.
    // --------------------------------------------------------------------
    let p1 = allocator.allocate(64);
    println!("\n[1] Allocate 64 bytes");
    allocator.print_alloc(64, p1);
    if p1.is_null() {
      eprintln!("[1] The break refused to grow, nothing to show");
      return;
    }
    p1.cast::<u32>().write(0xDEADBEEF);
    println!("[1] Value written to p1 = 0x{:X}", p1.cast::<u32>().read());

    let p2 = allocator.allocate(32);
    println!("\n[1] Allocate 32 bytes");
    allocator.print_alloc(32, p2);
    dump(&allocator);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Release p1. It is not the topmost block, so it is only flagged
    //    free and stays in the list.
    // --------------------------------------------------------------------
    allocator.release(p1);
    println!("\n[2] Released p1 at {:?}", p1);
    dump(&allocator);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate 16 bytes. First fit hands back p1, all 64 bytes of it.
    // --------------------------------------------------------------------
    let p3 = allocator.allocate(16);
    println!("\n[3] Allocate 16 bytes (check reuse of freed block)");
    allocator.print_alloc(16, p3);
    println!(
      "[3] p3 == p1? {}",
      if p3 == p1 {
        "Yes, it reused the freed block"
      } else {
        "No, it allocated somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Release p2. It touches the break, so the break moves back down.
    // --------------------------------------------------------------------
    print_program_break("before releasing p2");
    allocator.release(p2);
    print_program_break("after releasing p2");
    dump(&allocator);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Zeroed allocation and an overflowing one.
    // --------------------------------------------------------------------
    let zeroed = allocator.zero_allocate(4, 8);
    println!("\n[5] zero_allocate(4, 8) = {:?}", zeroed);
    if zeroed.is_null() {
      println!("[5] zero_allocate failed");
    } else {
      println!("[5] first word = {}", zeroed.cast::<u64>().read());
    }
    println!(
      "[5] zero_allocate(4, usize::MAX) = {:?}",
      allocator.try_zero_allocate(4, usize::MAX)
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Grow p3 past its block. The contents move to a new block and p3
    //    is released.
    // --------------------------------------------------------------------
    let grown = allocator.reallocate(p3, 64 * 1024);
    println!("\n[6] reallocate(p3, 64 KiB) = {:?}", grown);
    if grown.is_null() {
      println!("[6] reallocate failed, p3 is still allocated");
      allocator.release(p3);
    } else {
      println!("[6] Value carried over = 0x{:X}", grown.cast::<u32>().read());
    }
    print_program_break("after large realloc");
    dump(&allocator);

    allocator.release(grown);
    allocator.release(zeroed);

    println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
