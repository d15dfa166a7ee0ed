pub mod convolution;
pub mod lines;
pub mod lsf;
pub mod profile;
pub mod regions;
pub mod session;

pub use convolution::{ConvolutionEngine, ConvolutionError};
pub use lines::{load_line_list, AtomicDataCache, LineDataError, LineDataSource, LineEntry, LineList};
pub use lsf::{
    assign_kernels, kernel_request_span, DefaultLsfProvider, GaussianLsf, KernelAssignment,
    KernelSource, LsfError, LsfKernel, LsfProvider, TabulatedLsf,
};
pub use profile::{ProfileJacobian, ProfileModel};
pub use regions::{
    detect_grating_straddle, drop_straddling_regions, nearest_cluster, GroupingWarning,
    RegionError, RegionGrouper, WavelengthCluster,
};
pub use session::{FitSession, RegionGrouping};
