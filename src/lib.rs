//! td-2048: a TD(0) n-tuple learner for the Fibonacci variant of 2048.
//!
//! This crate provides:
//! - An array-based `Board` with Fibonacci-rule merges (`engine` module)
//! - A four-table n-tuple value network with symmetry-shared weights
//!   (`network` module) and its on-disk bank format (`weights` module)
//! - Self-play agents: the TD learning player, the random tile
//!   environment, and heuristic baselines (`agent` module)
//! - A binary replay format for episodes (`trace` module)
//!
//! Quick start:
//! ```
//! use td_2048::engine::{Board, Move};
//!
//! let mut b = Board::EMPTY;
//! assert_eq!(b.place(0, 1), 0);
//! assert_eq!(b.place(1, 1), 0);
//! // 1 + 1 is the kick-off merge: the pair becomes index 2, face fib(2) = 2
//! assert_eq!(b.slide(Move::Left), 2);
//! assert_eq!(b.get(0), 2);
//! ```
//!
//! Driving an episode couples a player to the environment:
//! ```no_run
//! use td_2048::agent::{Agent, Action, RandomEnv, TdPlayer};
//! use td_2048::engine::Board;
//!
//! let mut player = TdPlayer::new("init=tuples alpha=0.1")?;
//! let mut env = RandomEnv::new("seed=42")?;
//! let mut board = Board::EMPTY;
//! env.take_action(&board).apply(&mut board);
//! env.take_action(&board).apply(&mut board);
//!
//! player.open_episode("~start");
//! loop {
//!     let action = player.take_action(&board);
//!     if action.is_none() {
//!         break;
//!     }
//!     action.apply(&mut board);
//!     env.take_action(&board).apply(&mut board);
//! }
//! player.close_episode("~end");
//! # Ok::<(), td_2048::agent::AgentError>(())
//! ```

pub mod agent;
pub mod engine;
pub mod network;
pub mod trace;
pub mod weights;
