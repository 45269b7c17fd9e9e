use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use rover_navigation::StateReport;

/// What the operator side knows about the running mission.
#[derive(Debug, Clone)]
pub struct State {
    pub report: StateReport,
    pub reports_seen: u64,
    pub last_report_ts: Instant,
    pub faults: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            report: StateReport::default(),
            reports_seen: 0,
            last_report_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn record_report(bb: &Blackboard, report: &StateReport) {
    let mut g = bb.write();
    g.report = report.clone();
    g.reports_seen += 1;
    g.last_report_ts = Instant::now();
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_report_updates_snapshot() {
        let bb = Blackboard::default();
        let report = StateReport {
            x: 4,
            y: 2,
            status: "exploring".into(),
            ..StateReport::default()
        };
        record_report(&bb, &report);
        record_report(&bb, &report);

        let state = snapshot(&bb);
        assert_eq!(state.report, report);
        assert_eq!(state.reports_seen, 2);
    }

    #[test]
    fn test_faults_are_deduplicated() {
        let bb = Blackboard::default();
        raise_fault(&bb, "status feed stalled");
        raise_fault(&bb, "status feed stalled");
        assert_eq!(snapshot(&bb).faults.len(), 1, "the same fault is kept once");
    }
}
