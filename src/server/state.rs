use crate::forecast::WeatherFetcher;
use crate::region::RegionResolver;

pub struct AppState {
    pub resolver: RegionResolver,
    pub fetcher: WeatherFetcher,
}
