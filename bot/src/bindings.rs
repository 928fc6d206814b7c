// bot/src/bindings.rs
#![allow(clippy::all)]
use ethers::prelude::abigen;

// Compounding vault surface used by the bot. Only the calls we build or read.
abigen!(
    ICompounder,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function compound() external
        function nearestCompoundingTime() external view returns (uint256)
    ]"#
);

// END OF FILE: bot/src/bindings.rs
