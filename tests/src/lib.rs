//! Host-side scenario and property tests for the ESC controller

#[cfg(test)]
mod capture_tests;
#[cfg(test)]
mod scenario_tests;
#[cfg(test)]
mod shared_rpm_tests;
#[cfg(test)]
mod adapter_tests;
