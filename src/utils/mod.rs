pub mod multierr;
pub mod worker_pool;
