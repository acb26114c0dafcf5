//! Database-backed repository tests. All of them need PostgreSQL and are
//! ignored by default; run with `--ignored` against a disposable database.

mod job_queue_tests;
