// fn main not required
mod batch;
mod individual;
