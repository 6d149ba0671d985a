
mod test_options;
mod test_script_cache;
