//! Scalar training targets extracted from trajectory steps

use crate::trajectory::Trajectory;

/// Which scalar a tree learns from step `t` of a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExampleTarget {
    /// Value of one result-state dimension
    StateDim(usize),
    /// Change of one state dimension between premise and result
    StateChange(usize),
    Reward,
    /// 1.0 if the result is terminal, else 0.0
    Termination,
}

impl ExampleTarget {
    pub fn outcome(&self, trajectory: &Trajectory, t: usize) -> f64 {
        match *self {
            ExampleTarget::StateDim(i) => trajectory.result_state(t)[i],
            ExampleTarget::StateChange(i) => {
                trajectory.result_state(t)[i] - trajectory.premise_state(t)[i]
            }
            ExampleTarget::Reward => trajectory.reward(t),
            ExampleTarget::Termination => {
                if trajectory.result_terminal(t) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_read_the_right_fields() {
        let mut traj = Trajectory::new(vec![1.0, 5.0], false);
        traj.add_step(1, -1.0, vec![2.0, 3.0], true);

        assert_eq!(ExampleTarget::StateDim(1).outcome(&traj, 0), 3.0);
        assert_eq!(ExampleTarget::StateChange(1).outcome(&traj, 0), -2.0);
        assert_eq!(ExampleTarget::Reward.outcome(&traj, 0), -1.0);
        assert_eq!(ExampleTarget::Termination.outcome(&traj, 0), 1.0);
    }
}
