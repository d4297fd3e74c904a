use crate::domain::payment::PaymentMethod;
use rand::Rng;
use std::time::Duration;

/// Decides how long simulated bank processing takes and how it ends.
pub trait ProcessingPolicy: Send + Sync {
    fn processing_delay(&self, method: PaymentMethod) -> Duration;
    fn succeeds(&self, method: PaymentMethod) -> bool;
    fn refund_delay(&self) -> Duration;
}

/// Randomised behaviour: 5-10 s processing, 90% upi and 95% card success,
/// 3-5 s refund settlement.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedProcessing;

impl SimulatedProcessing {
    pub fn success_rate(method: PaymentMethod) -> f64 {
        match method {
            PaymentMethod::Upi => 0.90,
            PaymentMethod::Card => 0.95,
        }
    }
}

impl ProcessingPolicy for SimulatedProcessing {
    fn processing_delay(&self, _method: PaymentMethod) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(5_000..10_000))
    }

    fn succeeds(&self, method: PaymentMethod) -> bool {
        rand::thread_rng().gen_bool(Self::success_rate(method))
    }

    fn refund_delay(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(3_000..5_000))
    }
}

/// Deterministic behaviour for test mode.
#[derive(Debug, Clone, Copy)]
pub struct FixedProcessing {
    pub delay: Duration,
    pub success: bool,
    pub refund_delay: Duration,
}

impl FixedProcessing {
    pub fn instant(success: bool) -> Self {
        Self {
            delay: Duration::ZERO,
            success,
            refund_delay: Duration::ZERO,
        }
    }
}

impl ProcessingPolicy for FixedProcessing {
    fn processing_delay(&self, _method: PaymentMethod) -> Duration {
        self.delay
    }

    fn succeeds(&self, _method: PaymentMethod) -> bool {
        self.success
    }

    fn refund_delay(&self) -> Duration {
        self.refund_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_delays_stay_in_range() {
        let p = SimulatedProcessing;
        for _ in 0..200 {
            let d = p.processing_delay(PaymentMethod::Card);
            assert!(d >= Duration::from_secs(5) && d < Duration::from_secs(10));
            let r = p.refund_delay();
            assert!(r >= Duration::from_secs(3) && r < Duration::from_secs(5));
        }
    }

    #[test]
    fn fixed_policy_is_fixed() {
        let p = FixedProcessing {
            delay: Duration::from_millis(1000),
            success: false,
            refund_delay: Duration::ZERO,
        };
        assert_eq!(p.processing_delay(PaymentMethod::Upi), Duration::from_millis(1000));
        assert!(!p.succeeds(PaymentMethod::Upi));
        assert!(!p.succeeds(PaymentMethod::Card));
    }
}
