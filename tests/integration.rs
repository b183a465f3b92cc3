#![cfg(target_arch = "x86_64")]

use stampbench::assembler::NativeX64Provider;
use stampbench::codegen::{CodeImageGenerator, MarginPolicy};
use stampbench::exec_memory::ExecRegion;
use stampbench::template::CodeTemplateProvider;
use stampbench::timer::HighResolutionTimer;

const TEN_PAGES: usize = 4096 * 10;

/// Walks the whole pipeline by hand: acquire, generate, sync, call, time.
fn measure_once(region_size: usize, input: i32) -> (i32, u64, usize) {
    let template = NativeX64Provider.template().unwrap();
    let mut region = ExecRegion::acquire(region_size).unwrap();

    let layout =
        CodeImageGenerator::new(MarginPolicy::default()).fill(&mut region, &template);
    region.sync_instruction_cache().unwrap();

    let mut timer = HighResolutionTimer::new().unwrap();
    let entry = unsafe { region.entry_fn() };

    timer.start();
    let result = entry(input);
    timer.stop();

    (result, timer.duration_us(), layout.body_repetitions)
}

#[test]
fn generated_image_executes_and_returns() {
    let (result, duration_us, repetitions) = measure_once(TEN_PAGES, 100);

    // The arithmetic is opaque; what matters is that the call returned at
    // all, ran some body copies, and the stopwatch bracketed it.
    assert!(repetitions > 0);
    println!(
        "result={} duration_us={} body_repetitions={}",
        result, duration_us, repetitions
    );
}

#[test]
fn same_input_same_region_size_is_deterministic() {
    let (first, _, first_reps) = measure_once(TEN_PAGES, 100);
    let (second, _, second_reps) = measure_once(TEN_PAGES, 100);

    assert_eq!(first, second);
    assert_eq!(first_reps, second_reps);
}

#[test]
fn different_region_sizes_run_different_repetition_counts() {
    let (_, _, small_reps) = measure_once(4096, 100);
    let (_, _, large_reps) = measure_once(TEN_PAGES, 100);

    assert!(large_reps > small_reps);
}

#[test]
fn minimal_region_still_produces_a_callable_image() {
    let template = NativeX64Provider.template().unwrap();
    // Room for prologue + one body + epilogue + historical margin.
    let size = template.prologue().len() * 2 + template.body().len() * 2
        + template.epilogue().len();

    let (result, _, repetitions) = measure_once(size, 7);
    assert!(repetitions >= 1);

    let (again, _, _) = measure_once(size, 7);
    assert_eq!(result, again);
}
