pub mod gillespie;
pub mod ode;
