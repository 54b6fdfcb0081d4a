//! Generate a synthetic push-up angle stream for validation testing
//!
//! Pipe into the CLI: `cargo run --example gen_angles | reps count --input-format angles --dry-run`

use repcount::pipeline::{replay, SessionInput};
use repcount::types::{zero_totals, AngleSample, ExerciseKind};
use repcount::CounterConfig;

fn main() {
    // Five reps swinging between 175 and 55 degrees, 30 frames each
    let samples: Vec<AngleSample> = (0..150)
        .map(|i| {
            let phase = (i % 30) as f64 / 30.0 * std::f64::consts::TAU;
            let angle = 115.0 + 60.0 * phase.cos();
            AngleSample::from([(ExerciseKind::PushUp, Some(angle))])
        })
        .collect();

    for sample in &samples {
        match serde_json::to_string(sample) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Error: {e:?}"),
        }
    }

    let finished_at = chrono::Local::now().naive_local();
    match replay(
        &CounterConfig::default(),
        &[ExerciseKind::PushUp],
        &zero_totals(),
        &SessionInput::Angles(samples),
        finished_at,
    ) {
        Ok(summary) => eprintln!("Expected: {}", summary.record),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
