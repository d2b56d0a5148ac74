mod address_test;
mod fan_out_test;
mod pod_topology_test;
