use crate::model::method::{CorrCoef, Dependence, ExecutionMode, TestKind, TestMethod};

pub struct TestParams {
    // Test configuration
    pub method: TestMethod,
    pub corr_coef: CorrCoef,
    pub dependence: Dependence,
    pub test_kind: TestKind,

    // Permutation scheme
    pub permutations: usize,
    pub exec: ExecutionMode,
    pub seed: u64,
}

impl TestParams {
    pub fn new(
        method: TestMethod,
        corr_coef: CorrCoef,
        dependence: Dependence,
        test_kind: TestKind,
        permutations: usize,
        exec: ExecutionMode,
        seed: u64,
    ) -> Self {
        Self {
            method,
            corr_coef,
            dependence,
            test_kind,
            permutations,
            exec,
            seed,
        }
    }
}
