use std::io::BufRead;

use quark_predict::PredictionModel;

use crate::integrator::ReadIntegrator;

/// Run the interactive control loop over `reader` until `exit` is received
/// or the stream closes. Unknown commands are logged and ignored; malformed
/// `cache`/`pred` invocations are logged and ignored rather than panicking.
pub fn run(reader: impl BufRead, integrator: &ReadIntegrator) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::warn!("control stream read error: {err}");
                break;
            }
        };

        if !dispatch(line.trim(), integrator) {
            break;
        }
    }
}

/// Handle a single command line. Returns `false` when the loop should stop
/// (`exit` or a terminated stream).
fn dispatch(line: &str, integrator: &ReadIntegrator) -> bool {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("s") => {
            println!("{}", integrator.predictor().status());
            println!("{}", integrator.cache().status());
        }
        Some("enable") => {
            let enabled = integrator.toggle_prefetch();
            println!("{} optimizations", if enabled { "enabled" } else { "disabled" });
        }
        Some("cache") => match words.next() {
            Some(path) => {
                integrator.fetch_queue().enqueue(path.to_owned());
                println!("requested {path}");
            }
            None => log::warn!("cache command missing a path argument"),
        },
        Some("pred") => match words.next() {
            Some(path) => {
                let k = words
                    .next()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(1);
                let target = quark_cache::normalize(path);
                let predictions = integrator.predictor().predict(Some(&target), k);
                if !predictions.is_empty() {
                    println!("predicted {predictions:?}");
                }
            }
            None => log::warn!("pred command missing a path argument"),
        },
        Some("exit") => return false,
        Some(other) => log::debug!("ignoring unknown control command: {other}"),
        None => {}
    }
    true
}
