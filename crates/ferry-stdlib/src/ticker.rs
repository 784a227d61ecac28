//! Ticker: a counting event source
//!
//! `bump` increments and fires `changed(int)` on the calling thread.
//! `start(n)` counts `n` more steps on the background task queue, firing
//! `changed(int)` for each and `finished()` at the end.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use ferry_sdk::{
    task, AbiResult, EventSource, NativeError, NativeValue, Reflect, TypeDescriptor, TypeId,
};
use once_cell::sync::Lazy;

static DESCRIPTOR: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Ticker")
        .method("bump", &[], TypeId::VOID)
        .method("start", &[TypeId::INT], TypeId::VOID)
        .event("changed", &[TypeId::INT])
        .event("finished", &[])
        .readonly_property("value", TypeId::INT)
        .build()
});

const BUMP: usize = 0;
const START: usize = 1;
const CHANGED: usize = 2;
const FINISHED: usize = 3;

/// Counting event source
#[derive(Default)]
pub struct Ticker {
    value: Arc<AtomicI32>,
    events: Arc<EventSource>,
}

impl Ticker {
    /// Current count
    pub fn value(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }

    /// Increment and fire `changed` on the calling thread
    pub fn bump(&self) {
        let value = self.value.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.emit(CHANGED, &[NativeValue::int(value)]);
    }

    /// Count `steps` more on the background queue
    pub fn start(&self, steps: i32) {
        let value = self.value.clone();
        let events = self.events.clone();
        task::spawn(move || {
            for _ in 0..steps {
                let current = value.fetch_add(1, Ordering::SeqCst) + 1;
                events.emit(CHANGED, &[NativeValue::int(current)]);
            }
            events.emit(FINISHED, &[]);
        });
    }
}

impl Reflect for Ticker {
    fn descriptor() -> &'static TypeDescriptor {
        &DESCRIPTOR
    }

    fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
        match index {
            BUMP => self.bump(),
            START => {
                let steps = args[0].extract::<i32>()?;
                if steps < 0 {
                    return Err(NativeError::ArgumentError(format!("negative step count {}", steps)));
                }
                self.start(steps);
            }
            _ => return Err(NativeError::UnknownMember(index)),
        }
        Ok(NativeValue::void())
    }

    fn read_property(&self, index: usize) -> Option<NativeValue> {
        (index == 0).then(|| NativeValue::int(self.value()))
    }

    fn event_source(&self) -> Option<Arc<EventSource>> {
        Some(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_sdk::EventSink;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Recorder(mpsc::Sender<(usize, Vec<NativeValue>)>);

    impl EventSink for Recorder {
        fn fire(&self, method_index: usize, args: &[NativeValue]) {
            let _ = self.0.send((method_index, args.to_vec()));
        }
    }

    fn record(ticker: &Ticker) -> mpsc::Receiver<(usize, Vec<NativeValue>)> {
        let (tx, rx) = mpsc::channel();
        ticker.events.connect(Arc::new(Recorder(tx)));
        rx
    }

    #[test]
    fn test_bump_fires_changed() {
        let mut ticker = Ticker::default();
        let rx = record(&ticker);
        ticker.invoke(BUMP, &[]).unwrap();
        let (index, args) = rx.try_recv().unwrap();
        assert_eq!(index, CHANGED);
        assert_eq!(args[0].as_int(), Some(1));
        assert_eq!(ticker.read_property(0).unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_start_counts_then_finishes() {
        let mut ticker = Ticker::default();
        let rx = record(&ticker);
        ticker.invoke(START, &[NativeValue::int(3)]).unwrap();

        let timeout = Duration::from_secs(5);
        for expected in 1..=3 {
            let (index, args) = rx.recv_timeout(timeout).unwrap();
            assert_eq!(index, CHANGED);
            assert_eq!(args[0].as_int(), Some(expected));
        }
        let (index, args) = rx.recv_timeout(timeout).unwrap();
        assert_eq!(index, FINISHED);
        assert!(args.is_empty());
        assert_eq!(ticker.value(), 3);
    }

    #[test]
    fn test_negative_steps_rejected() {
        let mut ticker = Ticker::default();
        assert!(ticker.invoke(START, &[NativeValue::int(-1)]).is_err());
    }

    #[test]
    fn test_channel_signatures() {
        let signatures: Vec<String> = Ticker::descriptor()
            .events()
            .map(|(_, event)| event.signature())
            .collect();
        assert_eq!(signatures, vec!["changed(int)", "finished()"]);
    }
}
