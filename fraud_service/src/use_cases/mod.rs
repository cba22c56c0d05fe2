pub mod process_event;
