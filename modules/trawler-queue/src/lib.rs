pub mod broker;
pub mod bus;
pub mod tasks;

pub use broker::{TaskBroker, TaskEnvelope, LLM_QUEUE, SCRAPER_QUEUE};
pub use bus::ProgressBus;
pub use tasks::{DeepSearchTask, ScrapeContentTask, DEEP_SEARCH_TASK, SCRAPE_CONTENT_TASK};
