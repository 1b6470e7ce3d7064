pub mod review_sweeper;
