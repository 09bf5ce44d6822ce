//! Progress reporting for long refinement and coarsening runs.

use std::io::Write;
use std::time::Duration;

/// Which phase of the run a report describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Refinement,
    Coarsening,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Refinement => write!(f, "refining"),
            Phase::Coarsening => write!(f, "coarsening"),
        }
    }
}

/// The data sent during a report event.
#[derive(Clone, Copy, Debug)]
pub struct ReportData {
    /// The reporting phase.
    pub phase: Phase,
    /// Rounds completed in this phase so far.
    pub round: usize,
    /// Partitions currently in the graph.
    pub partitions: usize,
    /// Counter-examples outstanding at the start of the round (refinement
    /// only).
    pub outstanding: usize,
    /// Time spent in this phase so far.
    pub duration: Duration,
    /// Whether this phase is done.
    pub done: bool,
}

/// A sink for progress during an engine run.
pub trait Reporter {
    /// Reports one progress event.
    fn report(&mut self, data: ReportData);
}

/// A reporter that swallows everything.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _data: ReportData) {}
}

/// Writes one line per report event.
pub struct WriteReporter<'a, W> {
    writer: &'a mut W,
}

impl<'a, W> WriteReporter<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

impl<'a, W> Reporter for WriteReporter<'a, W>
where
    W: Write,
{
    fn report(&mut self, data: ReportData) {
        if data.done {
            let _ = writeln!(
                self.writer,
                "Done {}. rounds={}, partitions={}, sec={}",
                data.phase,
                data.round,
                data.partitions,
                data.duration.as_secs(),
            );
        } else {
            let _ = writeln!(
                self.writer,
                "{}. round={}, partitions={}, outstanding={}",
                data.phase, data.round, data.partitions, data.outstanding,
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_reporter_formats_rounds_and_completion() {
        let mut written: Vec<u8> = Vec::new();
        let mut reporter = WriteReporter::new(&mut written);
        reporter.report(ReportData {
            phase: Phase::Refinement,
            round: 0,
            partitions: 9,
            outstanding: 4,
            duration: Duration::from_secs(0),
            done: false,
        });
        reporter.report(ReportData {
            phase: Phase::Refinement,
            round: 3,
            partitions: 12,
            outstanding: 0,
            duration: Duration::from_secs(2),
            done: true,
        });
        let output = String::from_utf8(written).unwrap();
        assert_eq!(
            output,
            "refining. round=0, partitions=9, outstanding=4\n\
             Done refining. rounds=3, partitions=12, sec=2\n"
        );
    }
}
