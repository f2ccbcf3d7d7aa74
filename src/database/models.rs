pub mod job_config;
