mod tests_io;
mod tests_json;
