//! Generated protobuf/gRPC types for the river wire surfaces.

/// Block storage API: streaming ingest, cached reads, deletion.
pub mod block {
    tonic::include_proto!("river.block");
}

/// Control-plane pod API consumed by the job-shim.
pub mod pod {
    tonic::include_proto!("river.pod");
}
