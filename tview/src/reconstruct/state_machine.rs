use std::collections::BTreeMap;

use super::{Anomaly, AnomalyKind, Annotation, Interval, Reconstruction, ThreadState, ThreadTimeline, WaitTarget};
use crate::domain::{ObjectId, ThreadId};
use crate::format::{Event, EventKind, EventRecord};

/// Builds per-thread timelines from decoded events
///
/// Events may arrive in any interleaving across threads. Each thread's events
/// are stably sorted by timestamp before replay, so equal timestamps keep the
/// stored order; a timestamp that goes backwards in the stored order is
/// reported as [`AnomalyKind::OutOfOrderTimestamp`].
#[derive(Debug, Default)]
pub struct StateReconstructor {
    trace_end_ns: u64,
    threads: BTreeMap<ThreadId, Vec<EventRecord>>,
}

impl StateReconstructor {
    /// `trace_end_ns` closes timelines of threads that never ended
    #[must_use]
    pub fn new(trace_end_ns: u64) -> Self {
        Self {
            trace_end_ns,
            threads: BTreeMap::new(),
        }
    }

    pub fn ingest(&mut self, record: &EventRecord) {
        self.threads.entry(record.thread_id).or_default().push(*record);
    }

    pub fn ingest_all<'r>(&mut self, records: impl IntoIterator<Item = &'r EventRecord>) {
        for record in records {
            self.ingest(record);
        }
    }

    #[must_use]
    pub fn finish(self) -> Reconstruction {
        let mut reconstruction = Reconstruction::default();

        for (thread_id, mut events) in self.threads {
            let mut latest = 0u64;
            for record in &events {
                if record.timestamp_ns < latest {
                    reconstruction.anomalies.push(Anomaly {
                        thread_id,
                        timestamp_ns: record.timestamp_ns,
                        kind: AnomalyKind::OutOfOrderTimestamp { previous_ns: latest },
                    });
                } else {
                    latest = record.timestamp_ns;
                }
            }
            events.sort_by_key(|r| r.timestamp_ns);

            let mut machine = ThreadMachine::new(thread_id);
            for record in &events {
                machine.apply(record, &mut reconstruction.anomalies);
            }
            reconstruction
                .threads
                .push(machine.close(self.trace_end_ns, &mut reconstruction.anomalies));
        }

        reconstruction
    }
}

// =============================================================================
// PER-THREAD MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct OpenInterval {
    state: ThreadState,
    since_ns: u64,
    wait: Option<WaitTarget>,
}

#[derive(Debug)]
struct ThreadMachine {
    thread_id: ThreadId,
    start_ns: Option<u64>,
    current: Option<OpenInterval>,
    /// Set while the thread is ended; cleared if a later event reopens it
    ended_ns: Option<u64>,
    intervals: Vec<Interval>,
    annotations: Vec<Annotation>,
    /// Mutexes currently held, with multiplicity for recursive locks
    held: Vec<ObjectId>,
}

impl ThreadMachine {
    fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            start_ns: None,
            current: None,
            ended_ns: None,
            intervals: Vec::new(),
            annotations: Vec::new(),
            held: Vec::new(),
        }
    }

    fn apply(&mut self, record: &EventRecord, anomalies: &mut Vec<Anomaly>) {
        let ts = record.timestamp_ns;
        let kind = record.event.kind();
        let thread_id = self.thread_id;
        let mut flag = |anomaly: AnomalyKind| {
            anomalies.push(Anomaly {
                thread_id,
                timestamp_ns: ts,
                kind: anomaly,
            });
        };

        if self.start_ns.is_none() {
            self.start_ns = Some(ts);
            self.current = Some(OpenInterval {
                state: ThreadState::Executing,
                since_ns: ts,
                wait: None,
            });
            if kind == EventKind::ThreadStart {
                return;
            }
            flag(AnomalyKind::MissingThreadStart);
        } else if let Some(ended_ns) = self.ended_ns.take() {
            flag(AnomalyKind::EventAfterThreadEnd { event: kind });
            if ts > ended_ns {
                flag(AnomalyKind::TimelineGap {
                    from_ns: ended_ns,
                    to_ns: ts,
                });
            }
            let (state, wait) = self
                .intervals
                .last()
                .map_or((ThreadState::Executing, None), |last| (last.state, last.wait));
            self.current = Some(OpenInterval {
                state,
                since_ns: ended_ns,
                wait,
            });
            if kind == EventKind::ThreadStart {
                self.transition(ts, ThreadState::Executing, None);
                return;
            }
        }

        let Some(open) = self.current else {
            return;
        };
        let unexpected = AnomalyKind::UnexpectedEvent {
            event: kind,
            state: open.state,
        };

        match (open.state, record.event) {
            (_, Event::ThreadEnd) => {
                self.close_at(ts);
                self.ended_ns = Some(ts);
            }
            (_, Event::Annotation { message }) => {
                self.annotations.push(Annotation {
                    timestamp_ns: ts,
                    message,
                });
            }

            (ThreadState::Executing, Event::MutexLockAttempt { mutex }) => {
                self.transition(ts, ThreadState::BlockedSync, Some(WaitTarget::Mutex(mutex)));
            }
            (ThreadState::BlockedSync, Event::MutexLockAcquired { mutex }) => {
                // A condition wait resumes by reacquiring its own mutex
                let expected = match open.wait {
                    Some(WaitTarget::Mutex(expected) | WaitTarget::Condition { mutex: expected, .. }) => Some(expected),
                    _ => None,
                };
                if let Some(expected) = expected.filter(|&expected| expected != mutex) {
                    flag(AnomalyKind::MismatchedAcquire { expected, acquired: mutex });
                }
                self.held.push(mutex);
                self.transition(ts, ThreadState::Executing, None);
            }
            (ThreadState::Executing, Event::MutexLockAcquired { mutex }) => {
                self.held.push(mutex);
                flag(AnomalyKind::UncontendedAcquire { mutex });
            }
            (ThreadState::Executing, Event::MutexUnlock { mutex }) => {
                if let Some(pos) = self.held.iter().rposition(|&m| m == mutex) {
                    self.held.remove(pos);
                } else {
                    flag(AnomalyKind::UnmatchedUnlock { mutex });
                }
            }
            (ThreadState::Executing, Event::ConditionWait { condition, mutex }) => {
                if let Some(pos) = self.held.iter().rposition(|&m| m == mutex) {
                    self.held.remove(pos);
                }
                self.transition(ts, ThreadState::BlockedSync, Some(WaitTarget::Condition { condition, mutex }));
            }
            (ThreadState::Executing, Event::ConditionSignal { .. }) => {}
            (ThreadState::Executing, Event::SleepStart { duration_ns }) => {
                self.transition(ts, ThreadState::Sleeping, Some(WaitTarget::Sleep { requested_ns: duration_ns }));
            }
            (ThreadState::Sleeping, Event::SleepEnd) | (ThreadState::BlockedIo, Event::IoEnd) => {
                self.transition(ts, ThreadState::Executing, None);
            }
            (ThreadState::Executing, Event::IoStart { operation, target }) => {
                self.transition(ts, ThreadState::BlockedIo, Some(WaitTarget::Io { operation, target }));
            }

            _ => flag(unexpected),
        }
    }

    /// Close the open interval at `ts` and open `state`
    fn transition(&mut self, ts: u64, state: ThreadState, wait: Option<WaitTarget>) {
        self.close_at(ts);
        self.current = Some(OpenInterval {
            state,
            since_ns: ts,
            wait,
        });
    }

    fn close_at(&mut self, ts: u64) {
        let Some(open) = self.current.take() else {
            return;
        };
        let end_ns = ts.max(open.since_ns);
        if end_ns == open.since_ns {
            return;
        }

        if let Some(last) = self.intervals.last_mut() {
            if last.state == open.state && last.wait == open.wait && last.end_ns == open.since_ns {
                last.end_ns = end_ns;
                return;
            }
        }
        self.intervals.push(Interval {
            state: open.state,
            start_ns: open.since_ns,
            end_ns,
            wait: open.wait,
        });
    }

    fn close(mut self, trace_end_ns: u64, anomalies: &mut Vec<Anomaly>) -> ThreadTimeline {
        let start_ns = self.start_ns.unwrap_or(0);
        let end_ns = match (self.ended_ns, self.current) {
            (Some(ended_ns), _) => ended_ns,
            (None, Some(open)) => {
                let end_ns = trace_end_ns.max(open.since_ns);
                anomalies.push(Anomaly {
                    thread_id: self.thread_id,
                    timestamp_ns: end_ns,
                    kind: AnomalyKind::MissingThreadEnd,
                });
                self.close_at(end_ns);
                end_ns
            }
            (None, None) => start_ns,
        };

        ThreadTimeline {
            thread_id: self.thread_id,
            start_ns,
            end_ns,
            intervals: self.intervals,
            annotations: self.annotations,
        }
    }
}
