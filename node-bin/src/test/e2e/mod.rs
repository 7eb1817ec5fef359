mod runtime;
mod test_node;
