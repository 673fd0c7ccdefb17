pub mod periodic_sweeper;
