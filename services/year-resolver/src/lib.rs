//!
//! src/lib.rs  
//!
//! Release-year resolution for a personal music library. Reconciles the years 
//! reported by several unreliable providers with the years already on the 
//! album's tracks, and never silently overwrites a year a human chose. 
//!

pub mod config; 
pub mod errors; 
pub mod logging; 

pub mod types; 
pub mod provenance; 
pub mod changes; 

pub mod script; 
pub mod strategy; 
pub mod scoring; 

pub mod retry; 
pub mod fetch; 
pub mod activity; 
pub mod coordinator; 

pub mod consistency; 
pub mod fallback; 
pub mod pending; 
pub mod resolver; 

pub use crate::coordinator::{AlbumQuery, CallOutcome, CallTracker, SearchCoordinator};
pub use crate::errors::ResolverError;
pub use crate::fallback::{ArtistActivity, PendingReviewSink, VerificationReason};
pub use crate::resolver::YearResolver;
pub use crate::types::{CandidateRelease, LibraryTrack, ReleaseSource, YearResolution};
