pub mod candidates;
pub mod cdc;
pub mod distributions;
pub mod package_names;

pub use candidates::CandidateCorrelator;
pub use cdc::CdcPublisher;
pub use distributions::DistributionProcessor;
pub use package_names::PackageNameProcessor;
