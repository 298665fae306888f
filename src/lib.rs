pub mod clock;
pub mod config;
pub mod error;
pub mod features;
pub mod fetch;
pub mod geo;
pub mod live;
pub mod locator;
pub mod output;
pub mod refresh;
pub mod resolver;
pub mod stop;
pub mod timetable;
pub mod types;
