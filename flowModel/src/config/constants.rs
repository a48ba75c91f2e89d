// Spatial index constants
pub const QUADTREE_NODE_CAPACITY: usize = 16; // Points held by a leaf before it splits
pub const QUADTREE_MAX_DEPTH: usize = 24;
pub const QUADTREE_MIN_HALF_SIZE: f64 = 1e-9; // Degenerate extents are padded to this
pub const RADIUS_EPSILON: f64 = 1e-9; // Relative slack for node pruning only, never for membership

// Progress reporting
pub const PROGRESS_REPORT_STEPS: usize = 100; // At most this many callbacks per index build

// Optimizer defaults
pub const DEFAULT_MAX_ITERATIONS: usize = 500;
pub const DEFAULT_GRADIENT_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_OBJECTIVE_TOLERANCE: f64 = 1e-12;
pub const DEFAULT_FD_STEP: f64 = 1e-6;
pub const DEFAULT_ARMIJO_C1: f64 = 1e-4;
pub const DEFAULT_MAX_LINE_SEARCH: usize = 40;
pub const CURVATURE_EPSILON: f64 = 1e-12; // Skip the BFGS update when s·y < this * |s||y|
