#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use kpisync::backends::MemoryStore;
use kpisync::{FixedClock, RecordingSleeper, Scraper, SourceError, Syncer};
use kpisync_spec::Config;
use serde_json::Value;

/// Wednesday of ISO week 2024-19.
pub fn week_19() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 5, 8, 9, 30, 0).single().unwrap())
}

/// Scraper answering from canned outputs keyed by program name or URL.
#[derive(Default)]
pub struct StubScraper {
    pub outputs: HashMap<String, String>,
    pub docs: HashMap<String, Value>,
    pub calls: RefCell<Vec<String>>,
}

impl StubScraper {
    pub fn with_output(mut self, program: &str, output: &str) -> Self {
        self.outputs.insert(program.to_string(), output.to_string());
        self
    }

    pub fn with_doc(mut self, url: &str, doc: Value) -> Self {
        self.docs.insert(url.to_string(), doc);
        self
    }
}

impl Scraper for StubScraper {
    fn run_command(&self, program: &str, _args: &[String]) -> Result<String, SourceError> {
        self.calls.borrow_mut().push(program.to_string());
        self.outputs
            .get(program)
            .cloned()
            .ok_or_else(|| SourceError::Exit {
                program: program.to_string(),
                status: "exit status: 1".into(),
                stderr: "boom".into(),
            })
    }

    fn fetch_json(&self, url: &str) -> Result<Value, SourceError> {
        self.calls.borrow_mut().push(url.to_string());
        self.docs.get(url).cloned().ok_or_else(|| SourceError::Fetch {
            url: url.to_string(),
            message: "404 Not Found".into(),
        })
    }
}

pub type TestSyncer = Syncer<MemoryStore, StubScraper, FixedClock, RecordingSleeper>;

pub fn syncer(yaml: &str, store: MemoryStore, scraper: StubScraper) -> TestSyncer {
    let config = Config::from_yaml_str(yaml).expect("test config parses");
    Syncer::new(&config, store, scraper, week_19(), RecordingSleeper::default())
        .expect("test config binds")
}
